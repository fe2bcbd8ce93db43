//! Business logic services.

pub mod billing;
pub mod gemini;
pub mod ledger;
pub mod openai;
pub mod providers;
pub mod user;

pub use billing::{BillingService, WebhookOutcome};
pub use ledger::{check_quota, QuotaDecision, UsageLedger, UsageSummary};
pub use providers::{AudioUpload, ChatModel, ChatPrompt, MediaModel, ProviderError, Providers};
pub use user::{Profile, ResolvedUser, UserService};
