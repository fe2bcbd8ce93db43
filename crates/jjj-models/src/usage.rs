//! Usage counters and deltas.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::period::PeriodKeys;
use crate::tool::{bucket_field, Counter, Period, Tool};

/// Approximate speaking rate used to estimate clip length (characters per second).
pub const SPEECH_CHARS_PER_SECOND: usize = 15;

/// Chat counters for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChatCounters {
    #[serde(default)]
    pub messages: u64,
}

/// Text-to-speech counters for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TtsCounters {
    #[serde(default)]
    pub clips: u64,
    #[serde(default)]
    pub seconds: u64,
}

/// Image counters for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageCounters {
    #[serde(default)]
    pub images: u64,
}

/// Consumption of one successful tool call.
///
/// Also used as the cost of a pending call when checking quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageDelta {
    Chat { messages: u64 },
    Tts { clips: u64, seconds: u64 },
    Image { images: u64 },
}

impl UsageDelta {
    pub fn chat_message() -> Self {
        Self::Chat { messages: 1 }
    }

    pub fn tts_clip(seconds: u64) -> Self {
        Self::Tts { clips: 1, seconds }
    }

    pub fn image() -> Self {
        Self::Image { images: 1 }
    }

    pub fn tool(&self) -> Tool {
        match self {
            Self::Chat { .. } => Tool::Chat,
            Self::Tts { .. } => Tool::Tts,
            Self::Image { .. } => Tool::Image,
        }
    }

    /// Amount this delta adds to `counter` (0 if the counter does not belong to the tool).
    pub fn amount(&self, counter: Counter) -> u64 {
        match (self, counter) {
            (Self::Chat { messages }, Counter::Messages) => *messages,
            (Self::Tts { clips, .. }, Counter::Clips) => *clips,
            (Self::Tts { seconds, .. }, Counter::Seconds) => *seconds,
            (Self::Image { images }, Counter::Images) => *images,
            _ => 0,
        }
    }

    fn counters(&self) -> Vec<(Counter, u64)> {
        match self {
            Self::Chat { messages } => vec![(Counter::Messages, *messages)],
            Self::Tts { clips, seconds } => {
                vec![(Counter::Clips, *clips), (Counter::Seconds, *seconds)]
            }
            Self::Image { images } => vec![(Counter::Images, *images)],
        }
    }

    /// Increments for both the daily and the monthly bucket.
    ///
    /// Both families are written regardless of plan so that history survives
    /// plan changes. Zero amounts are skipped.
    pub fn increments(&self, keys: &PeriodKeys) -> Vec<CounterIncrement> {
        let tool = self.tool();
        [Period::Day, Period::Month]
            .into_iter()
            .flat_map(|period| {
                self.counters()
                    .into_iter()
                    .filter(|(_, by)| *by > 0)
                    .map(move |(counter, by)| CounterIncrement {
                        tool,
                        period,
                        key: keys.key(period).to_string(),
                        counter,
                        by,
                    })
            })
            .collect()
    }
}

/// One atomic counter increment: `{tool}{Period}[key].{counter} += by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterIncrement {
    pub tool: Tool,
    pub period: Period,
    pub key: String,
    pub counter: Counter,
    pub by: u64,
}

impl CounterIncrement {
    /// Unquoted field path segments, e.g. `["chatDaily", "2025-01-02", "messages"]`.
    pub fn segments(&self) -> [String; 3] {
        [
            bucket_field(self.tool, self.period),
            self.key.clone(),
            self.counter.as_str().to_string(),
        ]
    }
}

/// Estimated spoken length of `text`, at least one second.
pub fn estimate_speech_seconds(text: &str) -> u64 {
    let chars = text.chars().count();
    chars.div_ceil(SPEECH_CHARS_PER_SECOND).max(1) as u64
}
