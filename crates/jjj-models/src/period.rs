//! Bucket keys for usage periods.
//!
//! Counters are partitioned by a date-derived key. A new UTC day or month
//! produces a new key, which is how quotas reset without a rollover job.

use chrono::{DateTime, Utc};

use crate::tool::Period;

/// Day and month keys for one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodKeys {
    /// `YYYY-MM-DD` (UTC)
    pub day: String,
    /// `YYYY-MM` (UTC)
    pub month: String,
}

impl PeriodKeys {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            day: day_key(now),
            month: month_key(now),
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn key(&self, period: Period) -> &str {
        match period {
            Period::Day => &self.day,
            Period::Month => &self.month,
        }
    }
}

/// Day key in `YYYY-MM-DD` format.
pub fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Month key in `YYYY-MM` format.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}
