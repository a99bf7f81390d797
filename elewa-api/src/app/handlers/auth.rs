//! 认证相关 API handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use elewa_core::{LoginRequest, RefreshRequest, RegisterRequest, Registered, Session};

use super::super::error::ApiError;
use super::super::state::AppState;

/// POST /users/signup - 用户注册
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Registered>), ApiError> {
    let Json(req) = payload?;
    let registered = state.users.register(req).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// POST /users/login - 用户登录
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Session>, ApiError> {
    let Json(req) = payload?;
    let session = state.users.login(req).await?;
    Ok(Json(session))
}

/// POST /users/refresh - 刷新 token
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Session>, ApiError> {
    let Json(req) = payload?;
    let session = state.users.refresh(&req.refresh_token).await?;
    Ok(Json(session))
}
