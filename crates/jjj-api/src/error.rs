//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::services::providers::ProviderError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// A plan limit was hit.
    #[error("{0}")]
    QuotaExceeded(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    /// The inference provider rejected or failed the call.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Firestore error: {0}")]
    Firestore(#[from] jjj_firestore::FirestoreError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::QuotaExceeded(_) | ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream { status, .. } => *status,
            ApiError::Internal(_) | ApiError::Firestore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, ApiError::Internal(_) | ApiError::Firestore(_))
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(_) => ApiError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "AI provider not configured".to_string(),
            },
            ProviderError::Unauthorized(_) => ApiError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                message: "AI provider authentication failed".to_string(),
            },
            ProviderError::RateLimited(_) => ApiError::Upstream {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: "AI provider is busy, please retry shortly".to_string(),
            },
            ProviderError::Http(_) | ProviderError::Upstream { .. } | ProviderError::InvalidResponse(_) => {
                ApiError::Upstream {
                    status: StatusCode::BAD_GATEWAY,
                    message: "The AI provider request failed".to_string(),
                }
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let error = if self.is_internal()
            && std::env::var("ENVIRONMENT")
                .map(|e| e.eq_ignore_ascii_case("production"))
                .unwrap_or(false)
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut response = (status, Json(ErrorResponse { error })).into_response();
        if matches!(self, ApiError::RateLimited) {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}
