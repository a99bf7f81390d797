//! 用户资料 API handlers（需要登录）

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use elewa_core::{UpdateUserRequest, UserSummary};

use super::super::error::ApiError;
use super::super::middleware::AuthInfo;
use super::super::state::AppState;

/// GET /users - 列出所有用户
pub async fn list_users(
    State(state): State<AppState>,
    _auth: AuthInfo,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state.users.list_users().await?;
    Ok(Json(users))
}

/// GET /users/me - 当前登录用户
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthInfo,
) -> Result<Json<UserSummary>, ApiError> {
    let user = state.users.get_user(auth.user_id()).await?;
    Ok(Json(user))
}

/// GET /users/:user_id - 获取用户详情
pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthInfo,
    Path(user_id): Path<String>,
) -> Result<Json<UserSummary>, ApiError> {
    let user = state.users.get_user(&user_id).await?;
    Ok(Json(user))
}

/// PATCH /users/:user_id - 更新用户资料
pub async fn update_user(
    State(state): State<AppState>,
    _auth: AuthInfo,
    Path(user_id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserSummary>, ApiError> {
    let Json(req) = payload?;
    let user = state.users.update_user(&user_id, req).await?;
    Ok(Json(user))
}
