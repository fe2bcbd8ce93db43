//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::account::{delete_account, me, sign_in, sign_up, tts_usage, usage};
use crate::handlers::admin::{
    adjust_user_coins, delete_user, get_user, list_users, update_user_plan,
};
use crate::handlers::billing::razorpay_webhook;
use crate::handlers::tools::{chat, image, stt, tts};
use crate::handlers::{health, ready};
use crate::identity::device_identity;
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    IpRateLimit,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let tool_routes = Router::new()
        .route("/chat", post(chat))
        .route("/tts", post(tts))
        .route("/image", post(image))
        .route("/stt", post(stt));

    let account_routes = Router::new()
        .route("/me", get(me))
        .route("/usage", get(usage))
        .route("/usage/tts", get(tts_usage))
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/account", delete(delete_account));

    // Caller identity comes from the device cookie or x-user-id header.
    let identified_routes = Router::new()
        .merge(tool_routes)
        .merge(account_routes)
        .layer(middleware::from_fn_with_state(state.clone(), device_identity));

    // Admin routes authenticate with x-admin-key, not the device identity.
    let admin_routes = Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:uid", get(get_user).delete(delete_user))
        .route("/admin/users/:uid/plan", patch(update_user_plan))
        .route("/admin/users/:uid/coins", post(adjust_user_coins));

    let billing_routes = Router::new().route("/billing/webhook", post(razorpay_webhook));

    let rate_limiter = IpRateLimit::per_second(state.config.rate_limit_rps);

    let api_routes = Router::new()
        .merge(identified_routes)
        .merge(admin_routes)
        .merge(billing_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Multipart uploads honour the configured size, not axum's 2MB default.
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        // Must outlast the provider timeout.
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
