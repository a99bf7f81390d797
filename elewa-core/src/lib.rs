//! Core library for the store backend's identity layer: credential hashing, token issuance,
//! token persistence, and the registration/login/refresh orchestration.

mod clock;
mod config;
mod error;
pub mod store;
pub mod user;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::{AuthError, CredentialField, FieldError, Result};
pub use store::{StoreError, UserStore};
pub use user::{
    AuthToken, LoginRequest, PasswordHasher, RefreshRequest, RegisterRequest, Registered,
    Session, TokenClaims, TokenIssuer, TokenType, UpdateUserRequest, User, UserManager,
    UserSummary,
};
