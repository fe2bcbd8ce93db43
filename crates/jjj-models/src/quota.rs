//! Plan limits for the metered tools.
//!
//! Every limit is read from the environment with a hardcoded fallback and the
//! resulting [`QuotaConfig`] is injected wherever quotas are checked.

use serde::Serialize;

use crate::plan::PlanTier;
use crate::requests::ReplyLength;
use crate::tool::{Counter, Period, Tool};

/// Quota limits and per-plan input bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaConfig {
    pub free_chat_daily: u64,
    pub pro_chat_monthly: u64,
    pub free_tts_daily_clips: u64,
    pub pro_tts_daily_clips: u64,
    pub pro_tts_monthly_minutes: u64,
    pub free_image_daily: u64,
    pub pro_image_monthly: u64,
    pub free_tts_max_chars: usize,
    pub pro_tts_max_chars: usize,
    pub free_chat_max_chars: usize,
    pub pro_chat_max_chars: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_chat_daily: 30,
            pro_chat_monthly: 1000,
            free_tts_daily_clips: 5,
            pro_tts_daily_clips: 200,
            pro_tts_monthly_minutes: 300,
            free_image_daily: 5,
            pro_image_monthly: 300,
            free_tts_max_chars: 300,
            pro_tts_max_chars: 2000,
            free_chat_max_chars: 2000,
            pro_chat_max_chars: 8000,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl QuotaConfig {
    /// Load limits from environment variables. Unset or unparseable values use the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            free_chat_daily: env_or("FREE_CHAT_DAILY", d.free_chat_daily),
            pro_chat_monthly: env_or("PRO_CHAT_MONTHLY", d.pro_chat_monthly),
            free_tts_daily_clips: env_or("FREE_TTS_DAILY_CLIPS", d.free_tts_daily_clips),
            pro_tts_daily_clips: env_or("PRO_TTS_DAILY_CLIPS", d.pro_tts_daily_clips),
            pro_tts_monthly_minutes: env_or("PRO_TTS_MONTHLY_MINUTES", d.pro_tts_monthly_minutes),
            free_image_daily: env_or("FREE_IMAGE_DAILY", d.free_image_daily),
            pro_image_monthly: env_or("PRO_IMAGE_MONTHLY", d.pro_image_monthly),
            free_tts_max_chars: env_or("FREE_TTS_MAX_CHARS", d.free_tts_max_chars),
            pro_tts_max_chars: env_or("PRO_TTS_MAX_CHARS", d.pro_tts_max_chars),
            free_chat_max_chars: env_or("FREE_CHAT_MAX_CHARS", d.free_chat_max_chars),
            pro_chat_max_chars: env_or("PRO_CHAT_MAX_CHARS", d.pro_chat_max_chars),
        }
    }

    /// Rules enforced for `tool` under `plan`, in the order they are checked.
    pub fn rules(&self, plan: PlanTier, tool: Tool) -> Vec<QuotaRule> {
        use Counter::*;
        use Period::*;
        match (plan, tool) {
            (PlanTier::Free, Tool::Chat) => vec![QuotaRule::new(Day, Messages, self.free_chat_daily)],
            (PlanTier::Pro, Tool::Chat) => {
                vec![QuotaRule::new(Month, Messages, self.pro_chat_monthly)]
            }
            (PlanTier::Free, Tool::Tts) => {
                vec![QuotaRule::new(Day, Clips, self.free_tts_daily_clips)]
            }
            (PlanTier::Pro, Tool::Tts) => vec![
                QuotaRule::new(Day, Clips, self.pro_tts_daily_clips),
                QuotaRule::new(Month, Seconds, self.pro_tts_monthly_minutes.saturating_mul(60)),
            ],
            (PlanTier::Free, Tool::Image) => {
                vec![QuotaRule::new(Day, Images, self.free_image_daily)]
            }
            (PlanTier::Pro, Tool::Image) => {
                vec![QuotaRule::new(Month, Images, self.pro_image_monthly)]
            }
            (_, Tool::SpeechToText) => Vec::new(),
        }
    }

    /// The rule reported in usage summaries (the first one checked).
    pub fn primary_rule(&self, plan: PlanTier, tool: Tool) -> Option<QuotaRule> {
        self.rules(plan, tool).into_iter().next()
    }

    /// Maximum input length in characters, if the tool bounds it.
    pub fn max_chars(&self, plan: PlanTier, tool: Tool) -> Option<usize> {
        match (plan, tool) {
            (PlanTier::Free, Tool::Tts) => Some(self.free_tts_max_chars),
            (PlanTier::Pro, Tool::Tts) => Some(self.pro_tts_max_chars),
            (PlanTier::Free, Tool::Chat) => Some(self.free_chat_max_chars),
            (PlanTier::Pro, Tool::Chat) => Some(self.pro_chat_max_chars),
            _ => None,
        }
    }

    /// Daily text-to-speech clip cap for `plan`.
    pub fn tts_daily_clips(&self, plan: PlanTier) -> u64 {
        match plan {
            PlanTier::Free => self.free_tts_daily_clips,
            PlanTier::Pro => self.pro_tts_daily_clips,
        }
    }
}

/// One limit: `counter` in the current `period` bucket must stay within `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaRule {
    pub period: Period,
    pub counter: Counter,
    pub limit: u64,
}

impl QuotaRule {
    pub const fn new(period: Period, counter: Counter, limit: u64) -> Self {
        Self {
            period,
            counter,
            limit,
        }
    }

    /// Whether `requested` more units would exceed the limit.
    pub fn exceeded_by(&self, used: u64, requested: u64) -> bool {
        used.saturating_add(requested) > self.limit
    }

    /// User-facing message when this rule denies a call.
    pub fn denial_message(&self, tool: Tool, plan: PlanTier) -> String {
        let (amount, unit) = match self.counter {
            Counter::Seconds => (self.limit / 60, "minutes"),
            Counter::Messages => (self.limit, "messages"),
            Counter::Clips => (self.limit, "clips"),
            Counter::Images => (self.limit, "images"),
        };
        let mut msg = format!(
            "{} {} limit reached ({} {} per {} on the {} plan).",
            self.period.adjective(),
            tool.label(),
            amount,
            unit,
            self.period.as_str(),
            plan.display_name()
        );
        match plan {
            PlanTier::Free => msg.push_str(" Upgrade to Pro for more."),
            PlanTier::Pro => msg.push_str(" Your quota resets at the start of the next period."),
        }
        msg
    }
}

/// Completion token cap for a chat reply.
pub fn chat_token_cap(plan: PlanTier, length: ReplyLength) -> u32 {
    match (plan, length) {
        (PlanTier::Free, ReplyLength::Short) => 150,
        (PlanTier::Free, ReplyLength::Medium) => 300,
        (PlanTier::Free, ReplyLength::Long) => 500,
        (PlanTier::Pro, ReplyLength::Short) => 300,
        (PlanTier::Pro, ReplyLength::Medium) => 700,
        (PlanTier::Pro, ReplyLength::Long) => 1200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "FREE_CHAT_DAILY",
        "PRO_TTS_MONTHLY_MINUTES",
        "FREE_TTS_MAX_CHARS",
        "PRO_IMAGE_MONTHLY",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        assert_eq!(QuotaConfig::from_env(), QuotaConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides_and_ignores_garbage() {
        clear_env();
        std::env::set_var("FREE_CHAT_DAILY", "3");
        std::env::set_var("PRO_TTS_MONTHLY_MINUTES", "10");
        std::env::set_var("FREE_TTS_MAX_CHARS", "lots");
        let config = QuotaConfig::from_env();
        assert_eq!(config.free_chat_daily, 3);
        assert_eq!(config.pro_tts_monthly_minutes, 10);
        assert_eq!(config.free_tts_max_chars, 300);
        clear_env();
    }

    #[test]
    fn test_rules_per_plan() {
        let config = QuotaConfig::default();
        assert_eq!(
            config.rules(PlanTier::Free, Tool::Chat),
            vec![QuotaRule::new(Period::Day, Counter::Messages, 30)]
        );
        assert_eq!(
            config.rules(PlanTier::Pro, Tool::Tts),
            vec![
                QuotaRule::new(Period::Day, Counter::Clips, 200),
                QuotaRule::new(Period::Month, Counter::Seconds, 18_000),
            ]
        );
        assert_eq!(
            config.primary_rule(PlanTier::Pro, Tool::Image),
            Some(QuotaRule::new(Period::Month, Counter::Images, 300))
        );
        assert!(config.rules(PlanTier::Pro, Tool::SpeechToText).is_empty());
    }

    #[test]
    fn test_exceeded_by() {
        let rule = QuotaRule::new(Period::Day, Counter::Messages, 30);
        assert!(!rule.exceeded_by(29, 1));
        assert!(rule.exceeded_by(30, 1));
    }

    #[test]
    fn test_denial_message() {
        let rule = QuotaRule::new(Period::Day, Counter::Messages, 30);
        assert_eq!(
            rule.denial_message(Tool::Chat, PlanTier::Free),
            "Daily chat limit reached (30 messages per day on the Free plan). Upgrade to Pro for more."
        );
        let minutes = QuotaRule::new(Period::Month, Counter::Seconds, 18_000);
        assert!(minutes
            .denial_message(Tool::Tts, PlanTier::Pro)
            .starts_with("Monthly text-to-speech limit reached (300 minutes per month"));
    }

    #[test]
    fn test_max_chars() {
        let config = QuotaConfig::default();
        assert_eq!(config.max_chars(PlanTier::Free, Tool::Tts), Some(300));
        assert_eq!(config.max_chars(PlanTier::Pro, Tool::Tts), Some(2000));
        assert_eq!(config.max_chars(PlanTier::Free, Tool::Image), None);
    }

    #[test]
    fn test_chat_token_cap() {
        assert_eq!(chat_token_cap(PlanTier::Free, ReplyLength::Short), 150);
        assert_eq!(chat_token_cap(PlanTier::Pro, ReplyLength::Long), 1200);
    }
}
