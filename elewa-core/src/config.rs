use std::fmt;
use std::time::Duration;

use crate::error::{AuthError, FieldError, Result};

const DEFAULT_ISSUER: &str = "elewa-api";

/// Longest accepted token lifetime (ten years)
pub const MAX_TOKEN_TTL: i64 = 10 * 365 * 24 * 3600;

/// Settings consumed by the identity layer, built once at startup.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC signing secret for all tokens
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Access token lifetime (seconds)
    pub access_token_ttl: i64,
    /// Refresh token lifetime (seconds)
    pub refresh_token_ttl: i64,
    /// Tolerance applied to expiry checks (seconds), zero by default
    pub leeway: i64,
    pub bcrypt_cost: u32,
    /// Upper bound for each storage operation
    pub storage_timeout: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_issuer: DEFAULT_ISSUER.to_string(),
            access_token_ttl: 24 * 3600,      // 24 小时
            refresh_token_ttl: 7 * 24 * 3600, // 7 天
            leeway: 0,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            storage_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.jwt_issuer = issuer.into();
        self
    }

    pub fn with_ttl(mut self, access_ttl: i64, refresh_ttl: i64) -> Self {
        self.access_token_ttl = access_ttl;
        self.refresh_token_ttl = refresh_ttl;
        self
    }

    pub fn with_leeway(mut self, leeway: i64) -> Self {
        self.leeway = leeway.max(0);
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Startup check: both lifetimes in `1..=MAX_TOKEN_TTL`, refresh not shorter than access.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        for (field, ttl) in [
            ("access_token_ttl", self.access_token_ttl),
            ("refresh_token_ttl", self.refresh_token_ttl),
        ] {
            if ttl <= 0 || ttl > MAX_TOKEN_TTL {
                errors.push(FieldError::new(
                    field,
                    format!("must be between 1 and {} seconds", MAX_TOKEN_TTL),
                ));
            }
        }
        if errors.is_empty() && self.refresh_token_ttl < self.access_token_ttl {
            errors.push(FieldError::new(
                "refresh_token_ttl",
                "must not be shorter than access_token_ttl",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(errors))
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("leeway", &self.leeway)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("storage_timeout", &self.storage_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AuthConfig::new("config-test-secret").validate().is_ok());
    }

    #[test]
    fn out_of_range_ttls_are_rejected() {
        for (access, refresh) in [(0, 3600), (3600, i64::MAX), (MAX_TOKEN_TTL + 1, MAX_TOKEN_TTL + 1)] {
            let config = AuthConfig::new("config-test-secret").with_ttl(access, refresh);
            assert!(matches!(config.validate(), Err(AuthError::Validation(_))));
        }
    }

    #[test]
    fn refresh_must_outlive_access() {
        let config = AuthConfig::new("config-test-secret").with_ttl(7200, 3600);
        match config.validate() {
            Err(AuthError::Validation(errors)) => assert_eq!(errors[0].field, "refresh_token_ttl"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", AuthConfig::new("config-test-secret"));
        assert!(!rendered.contains("config-test-secret"));
    }
}
