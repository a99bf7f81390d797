use axum::http::Uri;
use axum::Json;
use serde_json::json;

use super::super::error::ApiError;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// 处理 404 错误
pub async fn handler_404(uri: Uri) -> ApiError {
    tracing::warn!(path = %uri.path(), "404 request");
    ApiError::not_found("requested resource does not exist")
}
