//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Store not configured: {0}")]
    NotConfigured(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Delay assumed for a 429 without a usable Retry-After.
const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 1000;

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::AuthError(msg),
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::AlreadyExists(msg),
            412 => Self::PreconditionFailed(msg),
            429 => Self::RateLimited(DEFAULT_RATE_LIMIT_DELAY_MS),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// HTTP status this error corresponds to, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::NotConfigured(_) | Self::Unavailable(_) => Some(503),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server-suggested delay before retrying.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirestoreError::Network(_)
                | FirestoreError::RateLimited(_)
                | FirestoreError::ServerError(_, _)
        )
    }

    /// True if the error was caused by a failed precondition (e.g., updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, FirestoreError::PreconditionFailed(_))
            || matches!(
                self,
                FirestoreError::RequestFailed(msg)
                if msg.contains("FAILED_PRECONDITION") || msg.contains("Precondition")
            )
    }

    /// True if the store could not be reached or was never set up.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            FirestoreError::NotConfigured(_)
                | FirestoreError::Unavailable(_)
                | FirestoreError::AuthError(_)
                | FirestoreError::Network(_)
        )
    }
}
