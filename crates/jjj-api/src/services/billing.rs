//! Razorpay webhook verification and plan entitlement updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, info, warn};

use jjj_firestore::{FirestoreError, FirestoreResult, UserStore};
use jjj_models::{
    extend_expiry, is_valid_user_id, PlanTier, PlanUpgrade, UserPatch, UserRecord, WebhookEvent,
};

use crate::metrics;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a webhook signature in constant time over the decoded digest.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// What a verified webhook did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Upgraded {
        user_id: String,
        plan_expires_at: DateTime<Utc>,
    },
    /// The payment was applied by an earlier delivery; nothing changed.
    AlreadyApplied {
        user_id: String,
        plan_expires_at: Option<DateTime<Utc>>,
    },
    /// Not an event that changes entitlements.
    Ignored,
    /// Upgrade could not be written.
    Failed,
}

/// Applies paid-plan upgrades from billing events.
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn UserStore>,
}

impl BillingService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, event: &WebhookEvent, now: DateTime<Utc>) -> WebhookOutcome {
        let Some(upgrade) = event.plan_upgrade() else {
            info!(event = %event.event, "Billing event ignored");
            metrics::record_billing_webhook(&event.event, "ignored");
            return WebhookOutcome::Ignored;
        };

        if !is_valid_user_id(&upgrade.user_id) {
            warn!(
                event = %event.event,
                payment_id = %upgrade.payment_id,
                "Billing event names an invalid user id, ignoring"
            );
            metrics::record_billing_webhook(&event.event, "invalid_user");
            return WebhookOutcome::Ignored;
        }

        match self.upgrade(&upgrade, now).await {
            Ok(Applied::Duplicate(existing)) => {
                info!(
                    user_id = %upgrade.user_id,
                    payment_id = %upgrade.payment_id,
                    "Payment already applied"
                );
                metrics::record_billing_webhook(&event.event, "duplicate");
                WebhookOutcome::AlreadyApplied {
                    user_id: upgrade.user_id,
                    plan_expires_at: existing,
                }
            }
            Ok(Applied::Extended(plan_expires_at)) => {
                info!(
                    user_id = %upgrade.user_id,
                    payment_id = %upgrade.payment_id,
                    plan_expires_at = %plan_expires_at,
                    "Plan upgraded to pro"
                );
                metrics::record_billing_webhook(&event.event, "upgraded");
                WebhookOutcome::Upgraded {
                    user_id: upgrade.user_id,
                    plan_expires_at,
                }
            }
            Err(e) => {
                error!(
                    user_id = %upgrade.user_id,
                    payment_id = %upgrade.payment_id,
                    error = %e,
                    "Failed to apply plan upgrade"
                );
                metrics::record_billing_webhook(&event.event, "failed");
                WebhookOutcome::Failed
            }
        }
    }

    async fn upgrade(&self, upgrade: &PlanUpgrade, now: DateTime<Utc>) -> FirestoreResult<Applied> {
        let existing = match self.store.get_user(&upgrade.user_id).await? {
            Some(user) => user,
            None => {
                warn!(user_id = %upgrade.user_id, "Payment for unknown user, creating record");
                let user = UserRecord::new_guest(&upgrade.user_id, now);
                match self.store.create_user(&user).await {
                    Ok(()) | Err(FirestoreError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
                user
            }
        };

        if existing.has_applied_payment(&upgrade.payment_id) {
            return Ok(Applied::Duplicate(existing.plan_expires_at));
        }

        let plan_expires_at = extend_expiry(existing.plan_expires_at, now);
        let patch = UserPatch {
            plan: Some(PlanTier::Pro),
            plan_expires_at: Some(Some(plan_expires_at)),
            pro_since: Some(existing.pro_since.unwrap_or(now)),
            pro_source: Some(upgrade.pro_source()),
            applied_payments: Some(existing.with_applied_payment(&upgrade.payment_id)),
            ..UserPatch::default()
        };
        self.store.merge_user(&upgrade.user_id, &patch).await?;
        Ok(Applied::Extended(plan_expires_at))
    }
}

enum Applied {
    Extended(DateTime<Utc>),
    Duplicate(Option<DateTime<Utc>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jjj_firestore::MemoryUserStore;

    fn captured(user_id: &str) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_123",
                "status": "captured",
                "notes": { "userId": user_id }
            }}}
        }))
        .unwrap()
    }

    fn order_paid(user_id: &str) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "event": "order.paid",
            "payload": {
                "payment": { "entity": {
                    "id": "pay_123",
                    "status": "captured",
                    "notes": { "userId": user_id }
                }},
                "order": { "entity": {
                    "id": "order_123",
                    "status": "paid",
                    "notes": { "userId": user_id }
                }}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_signature_round_trip_and_tamper() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign_payload("whsec", body);
        assert_eq!(sig.len(), 64);
        assert!(verify_signature("whsec", body, &sig));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("whsec", br#"{"event":"payment.failed"}"#, &sig));
        assert!(!verify_signature("whsec", body, "not-hex"));
        assert!(!verify_signature("whsec", body, ""));
    }

    #[tokio::test]
    async fn test_upgrade_sets_pro_for_thirty_days() {
        let store = Arc::new(MemoryUserStore::new());
        let now = Utc::now();
        store.insert(UserRecord::new_guest("u1", now)).await;
        let billing = BillingService::new(store.clone());

        let outcome = billing.handle(&captured("u1"), now).await;
        assert_eq!(
            outcome,
            WebhookOutcome::Upgraded {
                user_id: "u1".into(),
                plan_expires_at: now + Duration::days(30),
            }
        );

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.plan, PlanTier::Pro);
        assert_eq!(user.pro_since, Some(now));
        assert_eq!(user.pro_source.as_deref(), Some("razorpay:pay_123"));
    }

    #[tokio::test]
    async fn test_renewal_extends_from_current_expiry() {
        let store = Arc::new(MemoryUserStore::new());
        let now = Utc::now();
        let mut user = UserRecord::new_guest("u1", now);
        user.plan = PlanTier::Pro;
        user.plan_expires_at = Some(now + Duration::days(10));
        user.pro_since = Some(now - Duration::days(20));
        store.insert(user).await;

        let billing = BillingService::new(store.clone());
        billing.handle(&captured("u1"), now).await;

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.plan_expires_at, Some(now + Duration::days(40)));
        assert_eq!(user.pro_since, Some(now - Duration::days(20)));
    }

    #[tokio::test]
    async fn test_redelivered_payment_grants_one_period() {
        let store = Arc::new(MemoryUserStore::new());
        let now = Utc::now();
        store.insert(UserRecord::new_guest("u1", now)).await;
        let billing = BillingService::new(store.clone());

        billing.handle(&captured("u1"), now).await;
        let later = now + Duration::minutes(5);
        let outcome = billing.handle(&captured("u1"), later).await;
        assert_eq!(
            outcome,
            WebhookOutcome::AlreadyApplied {
                user_id: "u1".into(),
                plan_expires_at: Some(now + Duration::days(30)),
            }
        );

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.plan_expires_at, Some(now + Duration::days(30)));
        assert_eq!(user.applied_payments, vec!["pay_123".to_string()]);
    }

    #[tokio::test]
    async fn test_captured_then_order_paid_grants_one_period() {
        let store = Arc::new(MemoryUserStore::new());
        let now = Utc::now();
        store.insert(UserRecord::new_guest("u1", now)).await;
        let billing = BillingService::new(store.clone());

        assert!(matches!(
            billing.handle(&captured("u1"), now).await,
            WebhookOutcome::Upgraded { .. }
        ));
        assert!(matches!(
            billing.handle(&order_paid("u1"), now).await,
            WebhookOutcome::AlreadyApplied { .. }
        ));
        // A late redelivery of the capture changes nothing either.
        billing.handle(&captured("u1"), now + Duration::hours(1)).await;

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.plan_expires_at, Some(now + Duration::days(30)));
    }

    #[tokio::test]
    async fn test_invalid_note_user_id_is_ignored() {
        let store = Arc::new(MemoryUserStore::new());
        let billing = BillingService::new(store.clone());

        let too_long = "x".repeat(200);
        for bad in ["users/x", "a b", too_long.as_str()] {
            assert_eq!(billing.handle(&captured(bad), Utc::now()).await, WebhookOutcome::Ignored);
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_not_raised() {
        let store = Arc::new(MemoryUserStore::new());
        store.set_available(false);
        let billing = BillingService::new(store);
        assert_eq!(billing.handle(&captured("u1"), Utc::now()).await, WebhookOutcome::Failed);
    }

    #[tokio::test]
    async fn test_unrelated_events_are_ignored() {
        let store = Arc::new(MemoryUserStore::new());
        let billing = BillingService::new(store.clone());
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "refund.created",
            "payload": {}
        }))
        .unwrap();
        assert_eq!(billing.handle(&event, Utc::now()).await, WebhookOutcome::Ignored);
        assert!(store.is_empty().await);
    }
}
