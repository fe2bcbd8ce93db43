//! Admin user management.
//!
//! Every handler takes [`AdminKey`], so a missing or wrong `x-admin-key`
//! is rejected with 403 before any store access.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use jjj_firestore::UserPage;
use jjj_models::{AdminPlanUpdate, CoinAdjustRequest, ListUsersQuery, UserRecord};

use crate::error::ApiResult;
use crate::extract::{AdminKey, ValidatedJson};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Serialize)]
pub struct CoinBalanceResponse {
    pub uid: String,
    pub coins: u64,
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminKey,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<UserPage>> {
    query.validate()?;
    let page = state
        .users
        .list(query.limit.unwrap_or(DEFAULT_PAGE_SIZE), query.page_token.as_deref())
        .await?;
    Ok(Json(page))
}

/// GET /api/admin/users/:uid
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(uid): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.users.get(&uid).await?))
}

/// PATCH /api/admin/users/:uid/plan
pub async fn update_user_plan(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(uid): Path<String>,
    ValidatedJson(update): ValidatedJson<AdminPlanUpdate>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.users.set_plan(&uid, &update).await?))
}

/// POST /api/admin/users/:uid/coins
pub async fn adjust_user_coins(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(uid): Path<String>,
    ValidatedJson(req): ValidatedJson<CoinAdjustRequest>,
) -> ApiResult<Json<CoinBalanceResponse>> {
    let coins = state.users.adjust_coins(&uid, req.delta).await?;
    Ok(Json(CoinBalanceResponse { uid, coins }))
}

/// DELETE /api/admin/users/:uid
pub async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(uid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.users.delete(&uid).await?;
    info!(user_id = %uid, "Account deleted by admin");
    Ok(Json(json!({ "ok": true })))
}
