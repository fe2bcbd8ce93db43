//! Access-token cache for service-account authentication.
//!
//! One refresh at a time (write lock with a double check). A token is
//! refreshed a minute before it expires, and a failed refresh falls back to
//! the current token while it is still usable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the provider reports an expiry we cannot convert.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore REST access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe token cache shared by all clones of a client.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            auth,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Instant::now())) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Instant::now())) {
            return Ok(cached.access_token.clone());
        }

        match self.auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();
                let remaining = token.expires_at() - Utc::now();
                let expires_at = if remaining > chrono::Duration::zero() {
                    Instant::now() + remaining.to_std().unwrap_or(TOKEN_DEFAULT_TTL)
                } else {
                    // Forces a refresh on the next call.
                    Instant::now()
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                metrics::counter!("firestore_token_refresh_total", "outcome" => "ok").increment(1);
                debug!("Refreshed Firestore access token");
                Ok(access_token)
            }
            Err(e) => {
                metrics::counter!("firestore_token_refresh_total", "outcome" => "error")
                    .increment(1);
                if let Some(cached) = cache.as_ref().filter(|c| c.is_usable(Instant::now())) {
                    warn!(error = %e, "Token refresh failed, using existing token");
                    return Ok(cached.access_token.clone());
                }
                Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_freshness_window() {
        let now = Instant::now();
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: now + Duration::from_secs(30),
        };
        assert!(!token.is_fresh(now));
        assert!(token.is_usable(now));

        let token = CachedToken {
            access_token: "t".into(),
            expires_at: now + Duration::from_secs(600),
        };
        assert!(token.is_fresh(now));
    }

    #[test]
    fn test_firestore_scope() {
        assert!(FIRESTORE_SCOPE.ends_with("/auth/datastore"));
    }
}
