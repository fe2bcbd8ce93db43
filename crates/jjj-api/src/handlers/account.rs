//! Account and usage handlers.

use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use jjj_models::{SignInRequest, SignUpRequest};

use crate::error::ApiResult;
use crate::extract::ValidatedJson;
use crate::identity::{clear_identity_cookie, identity_cookie, Caller};
use crate::services::ledger::{TtsStatus, UsageSummary};
use crate::services::Profile;
use crate::state::AppState;

/// GET /api/me
pub async fn me(Caller(user): Caller) -> Json<Profile> {
    Json(Profile::from(&user.record))
}

/// GET /api/usage
pub async fn usage(State(state): State<AppState>, Caller(user): Caller) -> Json<UsageSummary> {
    Json(state.ledger.summary(&user.record, Utc::now()))
}

/// GET /api/usage/tts
pub async fn tts_usage(State(state): State<AppState>, Caller(user): Caller) -> Json<TtsStatus> {
    Json(state.ledger.tts_status(&user.record, Utc::now()))
}

/// POST /api/auth/signup
///
/// Upgrades the caller's guest record in place; the user id, coins and
/// usage counters carry over.
pub async fn sign_up(
    State(state): State<AppState>,
    Caller(user): Caller,
    ValidatedJson(req): ValidatedJson<SignUpRequest>,
) -> ApiResult<Json<Profile>> {
    let account = state.users.sign_up(&user, &req).await?;
    Ok(Json(Profile::from(&account)))
}

/// POST /api/auth/signin
///
/// Points the identity cookie at the matching account.
pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> ApiResult<(CookieJar, Json<Profile>)> {
    let account = state.users.sign_in(&req).await?;
    let jar = jar.add(identity_cookie(
        account.user_id.clone(),
        state.config.is_production(),
    ));
    Ok((jar, Json(Profile::from(&account))))
}

/// DELETE /api/account
pub async fn delete_account(
    State(state): State<AppState>,
    Caller(user): Caller,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<serde_json::Value>)> {
    state.users.delete(&user.user_id).await?;
    info!(user_id = %user.user_id, "Account deleted by owner");
    Ok((jar.remove(clear_identity_cookie()), Json(json!({ "ok": true }))))
}
