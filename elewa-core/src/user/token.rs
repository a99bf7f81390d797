//! JWT 签发与校验（HS256）

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::models::AuthToken;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

/// Token 类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// 访问受保护接口
    Access,
    /// 换取新的 token 对
    Refresh,
}

/// JWT Claims 结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject: 用户 ID
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub token_type: TokenType,
    /// 每个 token 唯一
    pub jti: String,
    pub iss: String,
    /// 签发时间戳 (Unix timestamp)
    pub iat: i64,
    /// 过期时间戳 (Unix timestamp)
    pub exp: i64,
}

/// 签发 access/refresh token 对，并校验 token 的签名与有效期。
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
    leeway: i64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.jwt_issuer.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            leeway: config.leeway,
            clock,
        }
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    /// 生成 access token 和 refresh token
    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<AuthToken> {
        let now = self.clock.now();
        let access_exp = expiry(now, self.access_ttl)?;
        let refresh_exp = expiry(now, self.refresh_ttl)?;

        let access_claims = TokenClaims {
            sub: user_id.to_string(),
            email: Some(email.to_string()),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            token_type: TokenType::Access,
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: access_exp,
        };

        // refresh token 只携带用户 ID
        let refresh_claims = TokenClaims {
            sub: user_id.to_string(),
            email: None,
            first_name: None,
            last_name: None,
            token_type: TokenType::Refresh,
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: refresh_exp,
        };

        Ok(AuthToken {
            access_token: self.sign(&access_claims)?,
            refresh_token: self.sign(&refresh_claims)?,
            expires_in: self.access_ttl,
            token_type: "Bearer".to_string(),
        })
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {}", e)))
    }

    /// 校验签名、结构与有效期（基于注入的时钟）
    pub fn validate(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp 由下方按注入时钟校验
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(classify)?
            .claims;

        if claims.exp + self.leeway < self.clock.now().timestamp() {
            return Err(AuthError::ExpiredToken);
        }
        Ok(claims)
    }

    /// 校验 access token（拒绝 refresh token）
    pub fn validate_access(&self, token: &str) -> Result<TokenClaims> {
        let claims = self.validate(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }

    /// 校验 refresh token（拒绝 access token）
    pub fn validate_refresh(&self, token: &str) -> Result<TokenClaims> {
        let claims = self.validate(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }
}

/// `now + ttl` as a unix timestamp, without panicking on out-of-range lifetimes
fn expiry(now: DateTime<Utc>, ttl: i64) -> Result<i64> {
    Duration::try_seconds(ttl)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .map(|exp| exp.timestamp())
        .ok_or_else(|| AuthError::Internal(format!("token lifetime of {}s is out of range", ttl)))
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::MalformedToken,
    }
}
