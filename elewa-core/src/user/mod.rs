//! 用户注册、认证与 token 生命周期

mod auth;
mod crypto;
mod manager;
mod models;
mod token;
mod validation;

pub use crypto::PasswordHasher;
pub use manager::UserManager;
pub use models::{
    AuthToken, LoginRequest, RefreshRequest, RegisterRequest, Registered, Session,
    UpdateUserRequest, User, UserSummary,
};
pub use token::{TokenClaims, TokenIssuer, TokenType};
pub use validation::{normalize_email, normalize_phone};
