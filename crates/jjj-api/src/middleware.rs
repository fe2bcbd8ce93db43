//! API middleware.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderName, HeaderValue, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics;

/// Keyed governor limiter, one bucket per client address.
type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Buckets kept before idle ones are swept.
const MAX_TRACKED_IPS: usize = 10_000;

/// Request budget shared by every `/api` route, per client address.
#[derive(Clone)]
pub struct IpRateLimit {
    limiter: Arc<KeyedLimiter>,
}

impl IpRateLimit {
    /// A zero rate is clamped to one request per second.
    pub fn per_second(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_second(rps))),
        }
    }

    /// Takes one request from `ip`'s bucket; false when it is empty.
    pub fn check(&self, ip: IpAddr) -> bool {
        let allowed = self.limiter.check_key(&ip).is_ok();
        if self.limiter.len() > MAX_TRACKED_IPS {
            // Full buckets carry no state worth keeping.
            self.limiter.retain_recent();
            debug!(tracked = self.limiter.len(), "Swept idle rate limit buckets");
        }
        allowed
    }
}

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};

    let allowed_headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        HeaderName::from_static("x-user-id"),
        HeaderName::from_static("x-admin-key"),
    ];

    // Quota headers on text-to-speech responses are read by the browser.
    let exposed_headers = [
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        HeaderName::from_static("x-tts-plan"),
        HeaderName::from_static("x-tts-today"),
        HeaderName::from_static("x-tts-dailylimit"),
        HeaderName::from_static("x-request-id"),
    ];

    let allowed_methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if origins.iter().any(|o| o == "*") {
        // Wildcard origin: no credentials, so Any is allowed everywhere.
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
            .allow_origin(Any)
            .max_age(std::time::Duration::from_secs(600))
    } else {
        // tower-http panics if credentials are combined with wildcard headers.
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
            .expose_headers(exposed_headers)
            .allow_credentials(true)
            .allow_origin(origins)
            .max_age(std::time::Duration::from_secs(600))
    }
}

/// Security headers middleware.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("strict-transport-security", "max-age=31536000; includeSubDomains"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
        (
            "permissions-policy",
            "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), payment=(), usb=()",
        ),
        ("cross-origin-resource-policy", "same-origin"),
        ("x-permitted-cross-domain-policies", "none"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    response
}

/// Request ID middleware.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());
    Span::current().record("request_id", &request_id);

    let mut response = next.run(request).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}

fn is_noise_path(path: &str) -> bool {
    matches!(path, "/health" | "/healthz" | "/ready" | "/metrics")
}

/// Logs one line per request; server errors at warn.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    if is_noise_path(&path) {
        return response;
    }
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        warn!(%method, %path, status, elapsed_ms, "Request failed");
    } else {
        info!(%method, %path, status, elapsed_ms, "Request served");
    }
    response
}

/// Rejects callers that have spent their per-address budget.
pub async fn rate_limit_middleware(
    State(limit): State<IpRateLimit>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    match client_ip(&request) {
        Some(ip) if !limit.check(ip) => {
            warn!(%ip, path = request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            ApiError::RateLimited.into_response()
        }
        _ => next.run(request).await,
    }
}

/// Caller address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let header = |name: &str| request.headers().get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .and_then(|hop| hop.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_budget_is_tracked_per_address() {
        let limit = IpRateLimit::per_second(1);
        assert!(limit.check(ip("10.0.0.1")));
        assert!(!limit.check(ip("10.0.0.1")));
        assert!(limit.check(ip("10.0.0.2")));
    }

    #[test]
    fn test_zero_rate_still_admits_one_request() {
        let limit = IpRateLimit::per_second(0);
        assert!(limit.check(ip("10.0.0.1")));
        assert!(!limit.check(ip("10.0.0.1")));
    }

    #[test]
    fn test_client_ip_resolution_order() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some(ip("203.0.113.7")));

        let request = Request::builder()
            .header("X-Forwarded-For", "not-an-ip")
            .header("X-Real-IP", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some(ip("198.51.100.2")));

        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));
        assert_eq!(client_ip(&request), Some(ip("192.0.2.9")));

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), None);
    }

    #[test]
    fn test_health_and_scrape_paths_are_not_logged() {
        assert!(is_noise_path("/healthz"));
        assert!(is_noise_path("/metrics"));
        assert!(!is_noise_path("/api/chat"));
    }
}
