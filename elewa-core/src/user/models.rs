//! 用户数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// 用户账户（存储模型，包含密码哈希与当前 token 对）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一 ID (UUID)
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    /// 邮箱（唯一，小写存储，用于登录）
    pub email: String,
    /// 手机号（唯一）
    pub phone: String,
    /// bcrypt 哈希后的密码
    pub password_hash: String,
    /// 当前有效的 access token
    #[serde(default)]
    pub token: String,
    /// 当前有效的 refresh token（每次登录/刷新时覆盖）
    #[serde(default)]
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

/// 登录请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 刷新请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// 更新用户资料请求（仅允许白名单字段）
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.phone.is_none()
    }
}

/// Token 对响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    /// Access token (JWT)
    pub access_token: String,
    /// Refresh token (JWT)
    pub refresh_token: String,
    /// Access token 过期时间（秒）
    pub expires_in: i64,
    /// Token 类型
    pub token_type: String,
}

/// 用户信息（不含密码哈希与 token）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// 注册结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registered {
    pub user_id: String,
    #[serde(flatten)]
    pub tokens: AuthToken,
}

/// 登录/刷新结果：用户信息 + 新签发的 token 对
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: UserSummary,
    #[serde(flatten)]
    pub tokens: AuthToken,
}
