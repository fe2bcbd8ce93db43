//! Retry policy with exponential backoff and jitter.
//!
//! Retries network errors, 429 (honoring Retry-After) and 5xx responses.
//! Everything else, including auth, not-found and precondition failures,
//! is returned to the caller on the first attempt.

use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_retry;

/// Upper bound on a server-requested delay.
const MAX_RETRY_AFTER_MS: u64 = 60_000;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl RetryConfig {
    /// Create config from `FIRESTORE_MAX_RETRIES`, `FIRESTORE_RETRY_BASE_MS`
    /// and `FIRESTORE_RETRY_MAX_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_u64("FIRESTORE_MAX_RETRIES", defaults.max_retries as u64) as u32,
            base_delay_ms: env_u64("FIRESTORE_RETRY_BASE_MS", defaults.base_delay_ms),
            max_delay_ms: env_u64("FIRESTORE_RETRY_MAX_MS", defaults.max_delay_ms),
        }
    }
}

/// Run `op`, retrying retryable failures with backoff.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    op: F,
) -> FirestoreResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = FirestoreResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let span = info_span!("firestore_retry", operation = %operation, attempt = attempt + 1);

        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt, e.retry_after_ms());

                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Firestore operation failed, retrying"
                );

                record_retry(operation);
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| FirestoreError::request_failed("Unknown error")))
}

/// Exponential backoff with full jitter, floored at the base delay.
fn calculate_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    if let Some(after) = retry_after_ms {
        return Duration::from_millis(after.min(MAX_RETRY_AFTER_MS));
    }

    let exp_delay = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped_delay = exp_delay.min(config.max_delay_ms);

    // Sub-second clock noise is enough jitter to spread concurrent retries.
    let jittered = if capped_delay > 0 {
        use std::time::SystemTime;
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let random_factor = (nanos % 1000) as f64 / 1000.0;
        ((capped_delay as f64) * random_factor) as u64
    } else {
        0
    };

    Duration::from_millis(jittered.max(config.base_delay_ms))
}
