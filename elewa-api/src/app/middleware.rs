use std::future::Future;
use std::pin::Pin;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use elewa_core::{AuthError, TokenClaims};

use super::error::ApiError;
use super::state::AppState;

/// 认证信息扩展：由中间件写入请求上下文，仅在本次请求内有效
#[derive(Debug, Clone)]
pub struct AuthInfo {
	pub claims: TokenClaims,
}

impl AuthInfo {
	pub fn user_id(&self) -> &str {
		&self.claims.sub
	}
}

impl<S: Send + Sync> FromRequestParts<S> for AuthInfo {
	type Rejection = ApiError;

	fn from_request_parts<'a, 'b, 'c>(
		parts: &'a mut Parts,
		_state: &'b S,
	) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'c>>
	where
		'a: 'c,
		'b: 'c,
	{
		Box::pin(async move {
			parts
				.extensions
				.get::<AuthInfo>()
				.cloned()
				.ok_or_else(|| ApiError::from(AuthError::MissingToken))
		})
	}
}

/// 不需要认证的路径
const PUBLIC_PATHS: &[&str] = &["/health", "/users/signup", "/users/login", "/users/refresh"];

/// 兼容旧客户端的 token header
const TOKEN_HEADER: &str = "token";

/// 从请求中提取 token（优先 Authorization: Bearer，fallback 到 `token` header）
fn extract_token(request: &Request<Body>) -> Option<String> {
	let headers = request.headers();
	let bearer = headers
		.get(header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| {
			// scheme 不区分大小写
			let (scheme, rest) = v.trim_start().split_once(' ')?;
			scheme.eq_ignore_ascii_case("bearer").then_some(rest)
		});
	let raw = bearer.or_else(|| headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()))?;

	let token = raw.trim();
	if token.is_empty() {
		None
	} else {
		Some(token.to_string())
	}
}

/// 校验 access token：缺失或无效时直接返回 401，不进入后续 handler
pub async fn auth_middleware(
	State(state): State<AppState>,
	mut request: Request<Body>,
	next: Next,
) -> Result<Response, ApiError> {
	let path = request.uri().path().to_string();

	// 公开端点不需要认证
	if PUBLIC_PATHS.iter().any(|p| path == *p) {
		return Ok(next.run(request).await);
	}

	let Some(token) = extract_token(&request) else {
		tracing::debug!(path = %path, "request rejected: missing token");
		return Err(AuthError::MissingToken.into());
	};

	let claims = match state.users.authenticate(&token) {
		Ok(c) => c,
		Err(e) => {
			tracing::debug!(path = %path, error = %e, "request rejected: invalid token");
			return Err(e.into());
		}
	};

	request.extensions_mut().insert(AuthInfo { claims });
	Ok(next.run(request).await)
}
