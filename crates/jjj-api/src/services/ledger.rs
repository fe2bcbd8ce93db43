//! Usage ledger: plan-tier quota checks and post-success usage recording.
//!
//! Checks run against the record snapshot loaded for the request, so the
//! check-then-increment pair is a soft limit under concurrency. The
//! increment itself uses the store's atomic field transform.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use jjj_firestore::UserStore;
use jjj_models::{Counter, Period, PeriodKeys, PlanTier, QuotaConfig, QuotaRule, Tool, UsageDelta, UserRecord};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::user::ResolvedUser;

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed { plan: PlanTier },
    Denied { plan: PlanTier, rule: QuotaRule, reason: String },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }
}

/// Check whether `delta` fits within the plan limits of `record` at `now`.
pub fn check_quota(
    record: &UserRecord,
    delta: &UsageDelta,
    now: DateTime<Utc>,
    config: &QuotaConfig,
) -> QuotaDecision {
    let plan = record.effective_plan(now);
    let tool = delta.tool();
    let keys = PeriodKeys::at(now);

    for rule in config.rules(plan, tool) {
        let used = record.used(tool, rule.period, keys.key(rule.period), rule.counter);
        let requested = delta.amount(rule.counter);
        if rule.exceeded_by(used, requested) {
            return QuotaDecision::Denied {
                plan,
                rule,
                reason: rule.denial_message(tool, plan),
            };
        }
    }
    QuotaDecision::Allowed { plan }
}

/// Usage of one tool against its primary rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolUsage {
    pub used: u64,
    pub limit: u64,
    pub period: Period,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageBreakdown {
    pub chat: ToolUsage,
    pub tts: ToolUsage,
    pub image: ToolUsage,
}

/// Body of `GET /api/usage`.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub plan: PlanTier,
    pub usage: UsageBreakdown,
}

/// Body of `GET /api/usage/tts`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsStatus {
    pub ok: bool,
    pub plan: PlanTier,
    pub today_clips: u64,
    pub daily_limit: u64,
    pub max_chars: usize,
}

/// Quota enforcement and usage recording for the metered tools.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn UserStore>,
    config: QuotaConfig,
    production: bool,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UserStore>, config: QuotaConfig, production: bool) -> Self {
        Self {
            store,
            config,
            production,
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Gate a metered call before the provider is contacted.
    ///
    /// Order: store availability, sign-in, input length, quota. Returns the
    /// plan the call runs under.
    pub fn guard(
        &self,
        user: &ResolvedUser,
        delta: &UsageDelta,
        input_chars: usize,
        now: DateTime<Utc>,
    ) -> ApiResult<PlanTier> {
        let tool = delta.tool();

        if user.degraded {
            metrics::record_quota_check(tool.as_str(), PlanTier::Free.as_str(), "degraded");
            if self.production {
                return Err(ApiError::internal("Usage tracking unavailable"));
            }
            warn!(user_id = %user.user_id, tool = %tool.as_str(), "Store unavailable, skipping quota gate");
            self.check_length(PlanTier::Free, tool, input_chars)?;
            return Ok(PlanTier::Free);
        }

        if tool.requires_account() && user.record.is_guest {
            return Err(ApiError::unauthorized("Sign in required"));
        }

        let plan = user.record.effective_plan(now);
        self.check_length(plan, tool, input_chars)?;

        match check_quota(&user.record, delta, now, &self.config) {
            QuotaDecision::Allowed { plan } => {
                metrics::record_quota_check(tool.as_str(), plan.as_str(), "allowed");
                Ok(plan)
            }
            QuotaDecision::Denied { plan, reason, .. } => {
                metrics::record_quota_check(tool.as_str(), plan.as_str(), "denied");
                debug!(user_id = %user.user_id, tool = %tool.as_str(), plan = %plan.as_str(), "Quota denied");
                Err(ApiError::quota_exceeded(reason))
            }
        }
    }

    fn check_length(&self, plan: PlanTier, tool: Tool, input_chars: usize) -> ApiResult<()> {
        match self.config.max_chars(plan, tool) {
            Some(max) if input_chars > max => Err(ApiError::bad_request(format!(
                "Text too long for the {} plan (max {} characters)",
                plan.display_name(),
                max
            ))),
            _ => Ok(()),
        }
    }

    /// Record consumption after a successful provider call.
    ///
    /// Increments both the daily and the monthly bucket. Store failures are
    /// logged and swallowed.
    pub async fn record_usage(&self, user: &ResolvedUser, delta: &UsageDelta, now: DateTime<Utc>) {
        let tool = delta.tool().as_str();
        if user.degraded {
            debug!(user_id = %user.user_id, tool, "Store unavailable, usage not recorded");
            return;
        }

        let increments = delta.increments(&PeriodKeys::at(now));
        match self.store.increment_usage(&user.user_id, &increments).await {
            Ok(()) => metrics::record_usage_recorded(tool),
            Err(e) => {
                warn!(user_id = %user.user_id, tool, error = %e, "Failed to record usage");
                metrics::record_usage_failed(tool);
            }
        }
    }

    fn tool_usage(&self, record: &UserRecord, plan: PlanTier, tool: Tool, keys: &PeriodKeys) -> ToolUsage {
        match self.config.primary_rule(plan, tool) {
            Some(rule) => ToolUsage {
                used: record.used(tool, rule.period, keys.key(rule.period), rule.counter),
                limit: rule.limit,
                period: rule.period,
            },
            None => ToolUsage {
                used: 0,
                limit: 0,
                period: Period::Day,
            },
        }
    }

    /// Current usage of every metered tool against its primary rule.
    pub fn summary(&self, record: &UserRecord, now: DateTime<Utc>) -> UsageSummary {
        let plan = record.effective_plan(now);
        let keys = PeriodKeys::at(now);
        UsageSummary {
            plan,
            usage: UsageBreakdown {
                chat: self.tool_usage(record, plan, Tool::Chat, &keys),
                tts: self.tool_usage(record, plan, Tool::Tts, &keys),
                image: self.tool_usage(record, plan, Tool::Image, &keys),
            },
        }
    }

    /// Today's text-to-speech clips for `record`.
    pub fn tts_clips_today(&self, record: &UserRecord, now: DateTime<Utc>) -> u64 {
        let keys = PeriodKeys::at(now);
        record.used(Tool::Tts, Period::Day, &keys.day, Counter::Clips)
    }

    pub fn tts_status(&self, record: &UserRecord, now: DateTime<Utc>) -> TtsStatus {
        let plan = record.effective_plan(now);
        TtsStatus {
            ok: true,
            plan,
            today_clips: self.tts_clips_today(record, now),
            daily_limit: self.config.tts_daily_clips(plan),
            max_chars: self.config.max_chars(plan, Tool::Tts).unwrap_or_default(),
        }
    }
}
