//! Request extractors: validated JSON bodies and the admin key.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// JSON body that has been deserialized and passed `Validate`.
///
/// Malformed bodies and failed validation are rejected with 400.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::bad_request(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Proof that the request carried the configured admin key.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

/// Fixed-width digest of a key, so comparisons do not depend on its length.
fn key_digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

/// Constant-time comparison of the presented key against the configured one.
pub fn admin_key_matches(configured: Option<&str>, presented: Option<&str>) -> bool {
    match (configured, presented) {
        (Some(expected), Some(given)) if !expected.is_empty() => {
            key_digest(expected)[..].ct_eq(&key_digest(given)[..]).into()
        }
        _ => false,
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        if admin_key_matches(state.config.admin_api_key.as_deref(), presented) {
            Ok(AdminKey)
        } else {
            warn!(path = %parts.uri.path(), "Rejected admin request");
            Err(ApiError::forbidden("Admin access required"))
        }
    }
}
