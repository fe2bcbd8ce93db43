//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "jjj_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "jjj_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "jjj_http_requests_in_flight";

    // Ledger metrics
    pub const QUOTA_CHECKS_TOTAL: &str = "jjj_quota_checks_total";
    pub const USAGE_RECORDED_TOTAL: &str = "jjj_usage_recorded_total";
    pub const USAGE_RECORD_FAILED_TOTAL: &str = "jjj_usage_record_failed_total";

    // Resolver metrics
    pub const USERS_CREATED_TOTAL: &str = "jjj_users_created_total";
    pub const RESOLVER_DEGRADED_TOTAL: &str = "jjj_resolver_degraded_total";

    // Provider metrics
    pub const PROVIDER_CALLS_TOTAL: &str = "jjj_provider_calls_total";
    pub const PROVIDER_CALL_DURATION_SECONDS: &str = "jjj_provider_call_duration_seconds";

    // Billing metrics
    pub const BILLING_WEBHOOKS_TOTAL: &str = "jjj_billing_webhooks_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "jjj_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a quota decision. `outcome` is `allowed`, `denied` or `degraded`.
pub fn record_quota_check(tool: &str, plan: &str, outcome: &str) {
    let labels = [
        ("tool", tool.to_string()),
        ("plan", plan.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::QUOTA_CHECKS_TOTAL, &labels).increment(1);
}

pub fn record_usage_recorded(tool: &str) {
    let labels = [("tool", tool.to_string())];
    counter!(names::USAGE_RECORDED_TOTAL, &labels).increment(1);
}

pub fn record_usage_failed(tool: &str) {
    let labels = [("tool", tool.to_string())];
    counter!(names::USAGE_RECORD_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_user_created() {
    counter!(names::USERS_CREATED_TOTAL).increment(1);
}

pub fn record_resolver_degraded() {
    counter!(names::RESOLVER_DEGRADED_TOTAL).increment(1);
}

/// Record a call to an inference provider.
pub fn record_provider_call(provider: &str, operation: &str, success: bool, duration_secs: f64) {
    let labels = [
        ("provider", provider.to_string()),
        ("operation", operation.to_string()),
        ("outcome", if success { "success" } else { "error" }.to_string()),
    ];
    counter!(names::PROVIDER_CALLS_TOTAL, &labels).increment(1);
    histogram!(names::PROVIDER_CALL_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a billing webhook delivery. `outcome` is `upgraded`, `ignored`, `rejected` or `failed`.
pub fn record_billing_webhook(event: &str, outcome: &str) {
    let labels = [
        ("event", event.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::BILLING_WEBHOOKS_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

fn path_patterns() -> &'static [(regex_lite::Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(regex_lite::Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
                ":id",
            ),
            (r"/admin/users/[^/]+", "/admin/users/:uid"),
        ]
        .into_iter()
        .filter_map(|(re, rep)| regex_lite::Regex::new(re).ok().map(|re| (re, rep)))
        .collect()
    })
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let mut path = path.to_string();
    for (re, rep) in path_patterns() {
        path = re.replace_all(&path, *rep).into_owned();
    }
    path
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
