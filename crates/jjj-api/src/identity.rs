//! Opaque caller identity.
//!
//! A device id travels in the `jjj_device_id` cookie, or in the `x-user-id`
//! header for non-browser clients. Requests carrying neither get a fresh
//! UUID v4 which is set as a cookie on the response.

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Request, Response};
use axum::middleware::Next;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, warn};
use uuid::Uuid;

use jjj_models::is_valid_user_id;

use crate::error::ApiError;
use crate::services::ResolvedUser;
use crate::state::AppState;

pub const DEVICE_COOKIE: &str = "jjj_device_id";
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity attached to the request by [`device_identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(pub String);

/// The identity cookie for `id`.
pub fn identity_cookie(id: impl Into<String>, secure: bool) -> Cookie<'static> {
    Cookie::build((DEVICE_COOKIE, id.into()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .permanent()
        .build()
}

/// Removal cookie for the identity.
pub fn clear_identity_cookie() -> Cookie<'static> {
    Cookie::build(DEVICE_COOKIE).path("/").build()
}

fn header_id(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| is_valid_user_id(id))
        .map(str::to_string)
}

fn sets_identity_cookie(response: &Response<Body>) -> bool {
    let prefix = format!("{}=", DEVICE_COOKIE);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

/// Device identity middleware.
pub async fn device_identity(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let from_cookie = jar
        .get(DEVICE_COOKIE)
        .map(|c| c.value().trim().to_string())
        .filter(|id| is_valid_user_id(id));

    let (id, issued) = match from_cookie.or_else(|| header_id(&request)) {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    if issued {
        debug!(device_id = %id, "Issued new device id");
    }

    request.extensions_mut().insert(DeviceId(id.clone()));
    let mut response = next.run(request).await;

    // Handlers that switch identity set their own cookie.
    if issued && !sets_identity_cookie(&response) {
        let cookie = identity_cookie(id, state.config.is_production());
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Failed to encode identity cookie"),
        }
    }

    response
}

/// The resolved caller. Resolution never fails; see [`ResolvedUser::degraded`].
#[derive(Debug, Clone)]
pub struct Caller(pub ResolvedUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let DeviceId(id) = parts
            .extensions
            .get::<DeviceId>()
            .cloned()
            .ok_or_else(|| ApiError::internal("Device identity middleware not installed"))?;

        Ok(Caller(state.users.resolve(&id).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_id_is_trimmed_and_validated() {
        let with_header = |value: &str| {
            Request::builder()
                .header(USER_ID_HEADER, value)
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(header_id(&with_header(" device_42 ")).as_deref(), Some("device_42"));
        assert_eq!(header_id(&with_header("users/other")), None);
        assert_eq!(header_id(&Request::new(Body::empty())), None);
    }

    #[test]
    fn test_identity_cookie_attributes() {
        let cookie = identity_cookie("abc", true).to_string();
        assert!(cookie.starts_with("jjj_device_id=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age="));

        assert!(!identity_cookie("abc", false).to_string().contains("Secure"));
    }
}
