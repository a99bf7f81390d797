use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

/// Common result type for core operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Unique credential keys on a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialField {
    Email,
    Phone,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialField::Email => f.write_str("email"),
            CredentialField::Phone => f.write_str("phone"),
        }
    }
}

/// A single offending input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {}", join(.0.iter().map(|e| format!("{}: {}", e.field, e.message))))]
    Validation(Vec<FieldError>),
    #[error("credential already in use: {}", join(.0.iter()))]
    DuplicateCredential(Vec<CredentialField>),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing token")]
    MissingToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    ExpiredToken,
    #[error("wrong token type")]
    WrongTokenType,
    #[error("token superseded")]
    SupersededToken,
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("storage operation timed out")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Token-level failures, all of which require the client to re-authenticate.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::MissingToken
                | AuthError::MalformedToken
                | AuthError::InvalidSignature
                | AuthError::ExpiredToken
                | AuthError::WrongTokenType
                | AuthError::SupersededToken
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AuthError::UserNotFound(id),
            StoreError::DuplicateKey(field) => AuthError::DuplicateCredential(vec![field]),
            StoreError::Timeout => AuthError::Timeout,
            StoreError::Io(e) => AuthError::Storage(e.to_string()),
            StoreError::Serde(e) => AuthError::Storage(e.to_string()),
        }
    }
}

fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}
