//! Shared data models for the JJJ AI Studio backend.
//!
//! This crate provides Serde-serializable types for:
//! - Plans, tools and usage period keys
//! - Usage counters and the per-user record
//! - Quota configuration
//! - Validated request payloads
//! - Billing webhook events

pub mod billing;
pub mod period;
pub mod plan;
pub mod quota;
pub mod requests;
pub mod tool;
pub mod usage;
pub mod user;

// Re-export common types
pub use billing::{extend_expiry, BillingEventKind, PlanUpgrade, WebhookEvent, PRO_PERIOD_DAYS};
pub use period::{day_key, month_key, PeriodKeys};
pub use plan::{InvalidPlan, PlanTier};
pub use quota::{chat_token_cap, QuotaConfig, QuotaRule};
pub use requests::{
    AdminPlanUpdate, ChatRequest, CoinAdjustRequest, ImageRequest, ImageSize, ListUsersQuery,
    ReplyLength, SignInRequest, SignUpRequest, TtsRequest, Voice,
};
pub use tool::{bucket_field, Counter, Period, Tool};
pub use usage::{
    estimate_speech_seconds, ChatCounters, CounterIncrement, ImageCounters, TtsCounters,
    UsageDelta,
};
pub use user::{
    apply_coin_delta, is_valid_user_id, UserPatch, UserRecord, MAX_APPLIED_PAYMENTS,
};
