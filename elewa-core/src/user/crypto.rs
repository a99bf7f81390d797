//! 密码哈希：bcrypt，摘要自带 salt 与 cost

use crate::error::{AuthError, Result};
use bcrypt::{hash, verify};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

/// 与 bcrypt 内部（私有）取值一致的 cost 范围
pub(crate) const BCRYPT_MIN_COST: u32 = 4;
pub(crate) const BCRYPT_MAX_COST: u32 = 31;

/// 替身摘要的明文，不对应任何账号
const DECOY_SECRET: &str = "elewa-decoy-credential";

/// bcrypt 密码哈希器（cost 可调）
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    /// 与真实摘要同 cost 的替身摘要，首次使用时生成
    decoy: Arc<OnceCell<String>>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(BCRYPT_MIN_COST, BCRYPT_MAX_COST),
            decoy: Arc::new(OnceCell::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// 异步哈希密码（在阻塞线程中执行 bcrypt）
    pub async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || hash(&password, cost))
            .await
            .map_err(|e| AuthError::Internal(format!("spawn_blocking failed: {}", e)))?
            .map_err(|e| AuthError::Internal(format!("bcrypt hash failed: {}", e)))
    }

    /// 异步验证密码；不匹配或摘要格式错误时返回 false
    pub async fn verify(&self, password: &str, digest: &str) -> Result<bool> {
        let password = password.to_string();
        let digest = digest.to_string();
        let outcome = tokio::task::spawn_blocking(move || verify(&password, &digest))
            .await
            .map_err(|e| AuthError::Internal(format!("spawn_blocking failed: {}", e)))?;
        match outcome {
            Ok(valid) => Ok(valid),
            Err(e) => {
                warn!(error = %e, "stored password digest could not be parsed");
                Ok(false)
            }
        }
    }

    /// 账号不存在时对替身摘要做一次完整 verify，使失败路径的耗时与密码错误一致
    pub async fn verify_decoy(&self, password: &str) -> Result<()> {
        let digest = self
            .decoy
            .get_or_try_init(|| self.hash(DECOY_SECRET))
            .await?;
        self.verify(password, digest).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn decoy_digest(&self) -> Option<&str> {
        self.decoy.get().map(String::as_str)
    }
}
