//! 认证：登录、刷新、access token 校验、token 持久化

use super::models::*;
use super::token::TokenClaims;
use super::validation::normalize_email;
use super::UserManager;
use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

impl UserManager {
    /// 用户登录；邮箱不存在与密码错误统一返回 `InvalidCredentials`
    #[instrument(skip(self, req))]
    pub async fn login(&self, req: LoginRequest) -> Result<Session> {
        req.validate()?;
        let email = normalize_email(&req.email);

        let Some(mut user) = self.store.find_by_email(&email).await? else {
            // 与密码错误路径付出同样的 bcrypt 开销
            self.hasher.verify_decoy(&req.password).await?;
            warn!("login failed: unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        // 验证密码
        let valid = self.hasher.verify(&req.password, &user.password_hash).await?;
        if !valid {
            warn!(user_id = %user.user_id, "login failed: invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        // 每次登录都轮换 token 对
        let tokens = self.issuer.issue(
            &user.user_id,
            &user.email,
            &user.first_name,
            &user.last_name,
        )?;
        let updated_at = self
            .update_tokens(&user.user_id, &tokens.access_token, &tokens.refresh_token)
            .await?;

        user.token = tokens.access_token.clone();
        user.refresh_token = tokens.refresh_token.clone();
        user.updated_at = updated_at;

        info!(user_id = %user.user_id, "user logged in");
        Ok(Session {
            user: user.into(),
            tokens,
        })
    }

    /// 用 refresh token 换取新的 token 对；旧 refresh token 随即失效
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let claims = self.issuer.validate_refresh(refresh_token)?;
        let user = self.store.find_by_id(&claims.sub).await?;

        let tokens = self.issuer.issue(
            &user.user_id,
            &user.email,
            &user.first_name,
            &user.last_name,
        )?;
        let now = self.clock.now();
        let swapped = self
            .store
            .swap_tokens(
                &user.user_id,
                refresh_token,
                &tokens.access_token,
                &tokens.refresh_token,
                now,
            )
            .await?;
        if !swapped {
            warn!(user_id = %user.user_id, "refresh rejected: token superseded");
            return Err(AuthError::SupersededToken);
        }

        let mut user = user;
        user.token = tokens.access_token.clone();
        user.refresh_token = tokens.refresh_token.clone();
        user.updated_at = now;

        info!(user_id = %user.user_id, "token refreshed");
        Ok(Session {
            user: user.into(),
            tokens,
        })
    }

    /// 校验 access token（纯签名 + 本地时钟，不访问存储）
    pub fn authenticate(&self, access_token: &str) -> Result<TokenClaims> {
        self.issuer.validate_access(access_token)
    }

    /// 覆盖用户存储的 token 对与 updated_at，返回写入的 updated_at
    #[instrument(skip(self, access_token, refresh_token))]
    pub async fn update_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        self.store
            .update_tokens(user_id, access_token, refresh_token, now)
            .await?;
        Ok(now)
    }
}
