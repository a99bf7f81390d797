//! 用户管理器：核心结构、注册与资料 CRUD

use super::crypto::PasswordHasher;
use super::models::*;
use super::token::TokenIssuer;
use super::validation::{normalize_email, normalize_phone};
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::{AuthError, CredentialField, FieldError, Result};
use crate::store::{ProfileUpdate, UserStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 用户管理器：组合密码哈希、token 签发与文档存储
#[derive(Debug, Clone)]
pub struct UserManager {
    pub(super) store: UserStore,
    pub(super) hasher: PasswordHasher,
    pub(super) issuer: TokenIssuer,
    pub(super) clock: Arc<dyn Clock>,
    config: AuthConfig,
}

// ============================================================================
// 构造器和配置
// ============================================================================

impl UserManager {
    /// 创建新的用户管理器（使用系统时钟）
    pub fn new<P: AsRef<Path>>(data_dir: P, config: AuthConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store: UserStore::new(data_dir, config.storage_timeout),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            issuer: TokenIssuer::new(&config, clock.clone()),
            clock,
            config,
        }
    }

    /// 替换时钟（token 签发、过期判断与时间戳共用）
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.issuer = TokenIssuer::new(&self.config, clock.clone());
        self.clock = clock;
        self
    }

    /// 确保存储目录存在
    pub fn ensure_dirs(&self) -> Result<()> {
        self.store.ensure_dirs().map_err(AuthError::from)
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

// ============================================================================
// 注册与用户 CRUD 操作
// ============================================================================

impl UserManager {
    /// 注册用户：校验 -> 唯一性检查 -> 哈希 -> 签发 token -> 一次性写入
    #[instrument(skip(self, req))]
    pub async fn register(&self, req: RegisterRequest) -> Result<Registered> {
        req.validate()?;
        let req = RegisterRequest {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            email: normalize_email(&req.email),
            phone: normalize_phone(&req.phone),
            password: req.password,
        };

        self.ensure_available(&req.email, &req.phone).await?;
        self.create_user(req).await
    }

    /// 预检查：两个检查都执行，冲突字段一并返回
    async fn ensure_available(&self, email: &str, phone: &str) -> Result<()> {
        let (email_taken, phone_taken) = tokio::try_join!(
            self.store.exists_email(email),
            self.store.exists_phone(phone)
        )?;
        let mut conflicts = Vec::new();
        if email_taken {
            conflicts.push(CredentialField::Email);
        }
        if phone_taken {
            conflicts.push(CredentialField::Phone);
        }
        if !conflicts.is_empty() {
            warn!(?conflicts, "registration rejected: credential already in use");
            return Err(AuthError::DuplicateCredential(conflicts));
        }
        Ok(())
    }

    /// 哈希、签发并写入已规范化的注册请求
    async fn create_user(&self, req: RegisterRequest) -> Result<Registered> {
        let password_hash = self.hasher.hash(&req.password).await?;

        let user_id = uuid::Uuid::new_v4().to_string();
        let tokens = self
            .issuer
            .issue(&user_id, &req.email, &req.first_name, &req.last_name)?;

        let now = self.clock.now();
        let user = User {
            user_id: user_id.clone(),
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            phone: req.phone,
            password_hash,
            token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            created_at: now,
            updated_at: now,
        };

        // 预检查之后的并发注册由存储层唯一索引兜底，冲突转换为 DuplicateCredential
        self.store.insert(&user).await?;

        info!(user_id = %user_id, "registered user");
        Ok(Registered { user_id, tokens })
    }

    /// 获取用户
    #[instrument(skip(self))]
    pub async fn get_user(&self, id: &str) -> Result<UserSummary> {
        Ok(self.store.find_by_id(id).await?.into())
    }

    /// 列出所有用户
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let users = self.store.list().await?;
        Ok(users.into_iter().map(UserSummary::from).collect())
    }

    /// 更新用户资料（first_name / last_name / phone）
    #[instrument(skip(self, req))]
    pub async fn update_user(&self, id: &str, req: UpdateUserRequest) -> Result<UserSummary> {
        if req.is_empty() {
            return Err(AuthError::Validation(vec![FieldError::new(
                "request",
                "at least one of first_name, last_name, phone is required",
            )]));
        }

        let current = self.store.find_by_id(id).await?;
        let merged = ProfileUpdate {
            first_name: req
                .first_name
                .map(|s| s.trim().to_string())
                .unwrap_or(current.first_name),
            last_name: req
                .last_name
                .map(|s| s.trim().to_string())
                .unwrap_or(current.last_name),
            phone: req
                .phone
                .map(|s| normalize_phone(&s))
                .unwrap_or(current.phone),
        };
        merged.validate()?;

        let user = self
            .store
            .update_profile(id, merged, self.clock.now())
            .await?;

        info!(user_id = %id, "updated user profile");
        Ok(user.into())
    }
}
