//! Payment gateway webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use jjj_models::WebhookEvent;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::billing::verify_signature;
use crate::services::WebhookOutcome;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// POST /api/billing/webhook
///
/// The signature covers the raw body bytes, so the body is parsed only after
/// verification. Write failures are acknowledged with `ok: false` so the
/// gateway does not retry indefinitely.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let secret = state
        .config
        .razorpay_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::internal("Webhook secret not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing signature"))?;

    if !verify_signature(secret, &body, signature) {
        warn!("Rejected webhook with invalid signature");
        metrics::record_billing_webhook("unknown", "rejected");
        return Err(ApiError::bad_request("Invalid signature"));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {}", e)))?;

    let response = match state.billing.handle(&event, Utc::now()).await {
        WebhookOutcome::Upgraded { .. } => json!({ "ok": true }),
        WebhookOutcome::AlreadyApplied { .. } => json!({ "ok": true, "duplicate": true }),
        WebhookOutcome::Ignored => json!({ "ok": true, "ignored": true }),
        WebhookOutcome::Failed => json!({ "ok": false }),
    };
    Ok(Json(response))
}
