//! Per-user record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::plan::PlanTier;
use crate::tool::{Counter, Period, Tool};
use crate::usage::{ChatCounters, CounterIncrement, ImageCounters, TtsCounters};

fn default_true() -> bool {
    true
}

/// One end user: identity, plan, coins and usage buckets.
///
/// Stored as `users/{userId}`. Bucket maps are keyed by day (`YYYY-MM-DD`) or
/// month (`YYYY-MM`); a missing key reads as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Argon2 PHC string. Never serialized to clients.
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(default = "default_true")]
    pub is_guest: bool,
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default)]
    pub coins: u64,

    #[serde(default)]
    pub chat_daily: BTreeMap<String, ChatCounters>,
    #[serde(default)]
    pub chat_monthly: BTreeMap<String, ChatCounters>,
    #[serde(default)]
    pub tts_daily: BTreeMap<String, TtsCounters>,
    #[serde(default)]
    pub tts_monthly: BTreeMap<String, TtsCounters>,
    #[serde(default)]
    pub image_daily: BTreeMap<String, ImageCounters>,
    #[serde(default)]
    pub image_monthly: BTreeMap<String, ImageCounters>,

    #[serde(default)]
    pub plan_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pro_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pro_source: Option<String>,
    /// Payment ids already applied to this record, oldest first.
    #[serde(default)]
    pub applied_payments: Vec<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Default record for a first-contact device: free guest, no usage.
    pub fn new_guest(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            password_hash: None,
            is_guest: true,
            plan: PlanTier::Free,
            coins: 0,
            chat_daily: BTreeMap::new(),
            chat_monthly: BTreeMap::new(),
            tts_daily: BTreeMap::new(),
            tts_monthly: BTreeMap::new(),
            image_daily: BTreeMap::new(),
            image_monthly: BTreeMap::new(),
            plan_expires_at: None,
            pro_since: None,
            pro_source: None,
            applied_payments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Plan the ledger enforces at `now`.
    ///
    /// A pro plan whose expiry has passed counts as free. Pro without an
    /// expiry (granted by an admin) does not lapse.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> PlanTier {
        match (self.plan, self.plan_expires_at) {
            (PlanTier::Pro, Some(expires)) if expires <= now => PlanTier::Free,
            (plan, _) => plan,
        }
    }

    /// Counter value in the bucket `key` of the `(tool, period)` family.
    pub fn used(&self, tool: Tool, period: Period, key: &str, counter: Counter) -> u64 {
        match (tool, period, counter) {
            (Tool::Chat, Period::Day, Counter::Messages) => {
                self.chat_daily.get(key).map_or(0, |c| c.messages)
            }
            (Tool::Chat, Period::Month, Counter::Messages) => {
                self.chat_monthly.get(key).map_or(0, |c| c.messages)
            }
            (Tool::Tts, Period::Day, Counter::Clips) => {
                self.tts_daily.get(key).map_or(0, |c| c.clips)
            }
            (Tool::Tts, Period::Day, Counter::Seconds) => {
                self.tts_daily.get(key).map_or(0, |c| c.seconds)
            }
            (Tool::Tts, Period::Month, Counter::Clips) => {
                self.tts_monthly.get(key).map_or(0, |c| c.clips)
            }
            (Tool::Tts, Period::Month, Counter::Seconds) => {
                self.tts_monthly.get(key).map_or(0, |c| c.seconds)
            }
            (Tool::Image, Period::Day, Counter::Images) => {
                self.image_daily.get(key).map_or(0, |c| c.images)
            }
            (Tool::Image, Period::Month, Counter::Images) => {
                self.image_monthly.get(key).map_or(0, |c| c.images)
            }
            _ => 0,
        }
    }

    /// Apply one increment in place. Counters that do not belong to the tool are ignored.
    pub fn apply_increment(&mut self, inc: &CounterIncrement) {
        let key = inc.key.clone();
        match (inc.tool, inc.period) {
            (Tool::Chat, Period::Day) => bump_chat(self.chat_daily.entry(key).or_default(), inc),
            (Tool::Chat, Period::Month) => {
                bump_chat(self.chat_monthly.entry(key).or_default(), inc)
            }
            (Tool::Tts, Period::Day) => bump_tts(self.tts_daily.entry(key).or_default(), inc),
            (Tool::Tts, Period::Month) => bump_tts(self.tts_monthly.entry(key).or_default(), inc),
            (Tool::Image, Period::Day) => {
                bump_image(self.image_daily.entry(key).or_default(), inc)
            }
            (Tool::Image, Period::Month) => {
                bump_image(self.image_monthly.entry(key).or_default(), inc)
            }
            (Tool::SpeechToText, _) => {}
        }
    }

    /// Overlay the fields set in `patch`.
    pub fn apply_patch(&mut self, patch: &UserPatch, now: DateTime<Utc>) {
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(hash) = &patch.password_hash {
            self.password_hash = Some(hash.clone());
        }
        if let Some(is_guest) = patch.is_guest {
            self.is_guest = is_guest;
        }
        if let Some(plan) = patch.plan {
            self.plan = plan;
        }
        if let Some(coins) = patch.coins {
            self.coins = coins;
        }
        if let Some(expires) = patch.plan_expires_at {
            self.plan_expires_at = expires;
        }
        if let Some(since) = patch.pro_since {
            self.pro_since = Some(since);
        }
        if let Some(source) = &patch.pro_source {
            self.pro_source = Some(source.clone());
        }
        if let Some(payments) = &patch.applied_payments {
            self.applied_payments = payments.clone();
        }
        self.updated_at = now;
    }
}

/// Payment ids kept per record; older entries are dropped first.
pub const MAX_APPLIED_PAYMENTS: usize = 50;

const MAX_USER_ID_LEN: usize = 128;

/// User ids become document names, so only URL-safe characters are accepted.
pub fn is_valid_user_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_USER_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl UserRecord {
    pub fn has_applied_payment(&self, payment_id: &str) -> bool {
        self.applied_payments.iter().any(|p| p == payment_id)
    }

    /// `applied_payments` with `payment_id` appended, bounded to [`MAX_APPLIED_PAYMENTS`].
    pub fn with_applied_payment(&self, payment_id: &str) -> Vec<String> {
        let mut payments = self.applied_payments.clone();
        payments.push(payment_id.to_string());
        let overflow = payments.len().saturating_sub(MAX_APPLIED_PAYMENTS);
        payments.drain(..overflow);
        payments
    }
}

fn bump_chat(c: &mut ChatCounters, inc: &CounterIncrement) {
    if inc.counter == Counter::Messages {
        c.messages = c.messages.saturating_add(inc.by);
    }
}

fn bump_tts(c: &mut TtsCounters, inc: &CounterIncrement) {
    match inc.counter {
        Counter::Clips => c.clips = c.clips.saturating_add(inc.by),
        Counter::Seconds => c.seconds = c.seconds.saturating_add(inc.by),
        _ => {}
    }
}

fn bump_image(c: &mut ImageCounters, inc: &CounterIncrement) {
    if inc.counter == Counter::Images {
        c.images = c.images.saturating_add(inc.by);
    }
}

/// Partial update of a user record. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_guest: Option<bool>,
    pub plan: Option<PlanTier>,
    pub coins: Option<u64>,
    /// `Some(None)` clears the expiry.
    pub plan_expires_at: Option<Option<DateTime<Utc>>>,
    pub pro_since: Option<DateTime<Utc>>,
    pub pro_source: Option<String>,
    /// Replaces the whole list.
    pub applied_payments: Option<Vec<String>>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Attach credentials to a guest record, turning it into an account.
    pub fn attach_account(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password_hash: Some(password_hash.into()),
            is_guest: Some(false),
            ..Self::default()
        }
    }
}

/// Apply a signed coin delta, saturating at zero.
pub fn apply_coin_delta(balance: u64, delta: i64) -> u64 {
    if delta >= 0 {
        balance.saturating_add(delta as u64)
    } else {
        balance.saturating_sub(delta.unsigned_abs())
    }
}
