//! Payment gateway webhook events and plan extension.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Length of one paid pro period.
pub const PRO_PERIOD_DAYS: i64 = 30;

/// Razorpay webhook envelope. Only the fields the entitlement updater reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<EntityWrapper<PaymentEntity>>,
    #[serde(default)]
    pub order: Option<EntityWrapper<OrderEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Object of merchant notes; the gateway sends `[]` when empty.
    #[serde(default)]
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntity {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

/// Event kinds the entitlement updater acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEventKind {
    PaymentCaptured,
    OrderPaid,
    Other(String),
}

/// A verified payment that should grant pro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanUpgrade {
    pub user_id: String,
    pub payment_id: String,
}

impl PlanUpgrade {
    /// Provenance recorded on the user record.
    pub fn pro_source(&self) -> String {
        format!("razorpay:{}", self.payment_id)
    }
}

fn note_user_id(notes: &serde_json::Value) -> Option<String> {
    ["userId", "user_id"]
        .iter()
        .filter_map(|k| notes.get(*k))
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

impl WebhookEvent {
    pub fn kind(&self) -> BillingEventKind {
        match self.event.as_str() {
            "payment.captured" => BillingEventKind::PaymentCaptured,
            "order.paid" => BillingEventKind::OrderPaid,
            other => BillingEventKind::Other(other.to_string()),
        }
    }

    fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }

    /// User id from the payment notes, falling back to the order notes.
    pub fn user_id(&self) -> Option<String> {
        self.payment()
            .and_then(|p| note_user_id(&p.notes))
            .or_else(|| {
                self.payload
                    .order
                    .as_ref()
                    .and_then(|o| note_user_id(&o.entity.notes))
            })
    }

    /// Upgrade carried by this event, if it is a completed payment for a known user.
    ///
    /// Keyed on the payment id so `payment.captured` and `order.paid` for one
    /// checkout name the same payment. Orders without a payment entity fall
    /// back to the order id.
    pub fn plan_upgrade(&self) -> Option<PlanUpgrade> {
        let payment = self.payment();
        let paid = match self.kind() {
            BillingEventKind::PaymentCaptured => {
                payment.and_then(|p| p.status.as_deref()) == Some("captured")
            }
            BillingEventKind::OrderPaid => true,
            BillingEventKind::Other(_) => false,
        };
        if !paid {
            return None;
        }

        let payment_id = payment
            .map(|p| p.id.clone())
            .or_else(|| self.payload.order.as_ref().map(|o| o.entity.id.clone()))?;

        Some(PlanUpgrade {
            user_id: self.user_id()?,
            payment_id,
        })
    }
}

/// New pro expiry: one period after the later of `now` and the current expiry.
pub fn extend_expiry(existing: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = existing.filter(|e| *e > now).unwrap_or(now);
    base + Duration::days(PRO_PERIOD_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn captured(notes: serde_json::Value) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "entity": "event",
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_123",
                        "status": "captured",
                        "amount": 49900,
                        "currency": "INR",
                        "notes": notes
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_captured_payment_yields_upgrade() {
        let event = captured(serde_json::json!({"userId": "u-1"}));
        assert_eq!(event.kind(), BillingEventKind::PaymentCaptured);
        let upgrade = event.plan_upgrade().unwrap();
        assert_eq!(upgrade.user_id, "u-1");
        assert_eq!(upgrade.pro_source(), "razorpay:pay_123");
    }

    #[test]
    fn test_snake_case_note_and_empty_notes() {
        let event = captured(serde_json::json!({"user_id": "u-2"}));
        assert_eq!(event.user_id().as_deref(), Some("u-2"));

        let event = captured(serde_json::json!([]));
        assert!(event.user_id().is_none());
        assert!(event.plan_upgrade().is_none());
    }

    #[test]
    fn test_authorized_payment_is_not_an_upgrade() {
        let mut event = captured(serde_json::json!({"userId": "u-1"}));
        if let Some(p) = event.payload.payment.as_mut() {
            p.entity.status = Some("authorized".into());
        }
        assert!(event.plan_upgrade().is_none());
    }

    #[test]
    fn test_order_paid_uses_order_notes() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "order.paid",
            "payload": {
                "order": {"entity": {"id": "order_9", "status": "paid", "notes": {"userId": "u-3"}}}
            }
        }))
        .unwrap();
        let upgrade = event.plan_upgrade().unwrap();
        assert_eq!(upgrade.user_id, "u-3");
        assert_eq!(upgrade.payment_id, "order_9");
    }

    #[test]
    fn test_order_paid_keys_on_the_payment_id() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "event": "order.paid",
            "payload": {
                "payment": {"entity": {"id": "pay_1", "status": "captured", "notes": {"userId": "u-4"}}},
                "order": {"entity": {"id": "order_1", "status": "paid", "notes": {"userId": "u-4"}}}
            }
        }))
        .unwrap();
        let upgrade = event.plan_upgrade().unwrap();
        assert_eq!(upgrade.payment_id, "pay_1");
        assert_eq!(upgrade.pro_source(), "razorpay:pay_1");
    }

    #[test]
    fn test_extend_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(extend_expiry(None, now), now + Duration::days(30));

        let past = now - Duration::days(3);
        assert_eq!(extend_expiry(Some(past), now), now + Duration::days(30));

        let future = now + Duration::days(10);
        assert_eq!(extend_expiry(Some(future), now), now + Duration::days(40));
    }
}
