//! AI tools and the counters the ledger keeps for them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One AI capability exposed by the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Chat,
    Tts,
    Image,
    SpeechToText,
}

impl Tool {
    /// Tools that are quota-checked and metered.
    pub const METERED: [Tool; 3] = [Tool::Chat, Tool::Tts, Tool::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Chat => "chat",
            Tool::Tts => "tts",
            Tool::Image => "image",
            Tool::SpeechToText => "stt",
        }
    }

    /// Whether the tool requires a signed-in (non-guest) account.
    pub fn requires_account(&self) -> bool {
        self.is_metered()
    }

    pub fn is_metered(&self) -> bool {
        matches!(self, Tool::Chat | Tool::Tts | Tool::Image)
    }

    /// Noun used in quota messages ("chat", "text-to-speech", ...).
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Chat => "chat",
            Tool::Tts => "text-to-speech",
            Tool::Image => "image",
            Tool::SpeechToText => "speech-to-text",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Month => "month",
        }
    }

    /// Suffix of the store field holding this period's buckets.
    pub fn field_suffix(&self) -> &'static str {
        match self {
            Period::Day => "Daily",
            Period::Month => "Monthly",
        }
    }

    pub fn adjective(&self) -> &'static str {
        match self {
            Period::Day => "Daily",
            Period::Month => "Monthly",
        }
    }
}

/// A single counter inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Counter {
    Messages,
    Clips,
    Seconds,
    Images,
}

impl Counter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::Messages => "messages",
            Counter::Clips => "clips",
            Counter::Seconds => "seconds",
            Counter::Images => "images",
        }
    }
}

/// Store field name of a bucket family, e.g. `chatDaily` or `ttsMonthly`.
pub fn bucket_field(tool: Tool, period: Period) -> String {
    format!("{}{}", tool.as_str(), period.field_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_field_names() {
        assert_eq!(bucket_field(Tool::Chat, Period::Day), "chatDaily");
        assert_eq!(bucket_field(Tool::Tts, Period::Month), "ttsMonthly");
        assert_eq!(bucket_field(Tool::Image, Period::Day), "imageDaily");
    }

    #[test]
    fn test_only_generation_tools_are_metered() {
        assert!(Tool::METERED.iter().all(|t| t.is_metered()));
        assert!(!Tool::SpeechToText.is_metered());
        assert!(!Tool::SpeechToText.requires_account());
    }
}
