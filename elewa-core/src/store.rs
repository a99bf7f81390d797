//! File-backed JSON document store for user records.
//!
//! Layout under the data directory:
//! - `users/<user_id>.json`: one document per user
//! - `users/index.json`: unique index, email -> user_id and phone -> user_id
//!
//! Every document write goes to a temp file that is renamed into place, so a reader never
//! observes a half-written record. Writers serialize on a store-wide lock and the unique index
//! is re-checked under that lock, which makes it the enforcement point for email/phone
//! uniqueness. An index entry only holds its key while the document it names still carries
//! that key. Each public operation runs under the configured timeout.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::CredentialField;
use crate::user::User;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("unique index violation on {0}")]
    DuplicateKey(CredentialField),
    #[error("storage operation timed out")]
    Timeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Whitelisted profile fields written by a profile update.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UniqueIndex {
    #[serde(default)]
    email: HashMap<String, String>,
    #[serde(default)]
    phone: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct UserStore {
    data_dir: PathBuf,
    timeout: Duration,
    write_lock: Arc<Mutex<()>>,
}

impl UserStore {
    pub fn new<P: AsRef<Path>>(data_dir: P, timeout: Duration) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            timeout,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 确保用户目录存在
    pub fn ensure_dirs(&self) -> StoreResult<()> {
        std::fs::create_dir_all(self.users_dir())?;
        Ok(())
    }

    fn users_dir(&self) -> PathBuf {
        self.data_dir.join("users")
    }

    fn index_path(&self) -> PathBuf {
        self.users_dir().join("index.json")
    }

    fn user_path(&self, id: &str) -> PathBuf {
        self.users_dir().join(format!("{}.json", id))
    }

    /// ids become file names, so only `[A-Za-z0-9_-]` is accepted
    fn valid_id(id: &str) -> bool {
        !id.is_empty()
            && id != "index"
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    }

    /// Bounds `fut` by the store timeout; the future is dropped when the deadline passes.
    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "storage operation timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    async fn write_atomic(&self, path: &Path, data: Vec<u8>) -> StoreResult<()> {
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn load_index(&self) -> StoreResult<UniqueIndex> {
        Ok(self.read_index().await?.unwrap_or_default())
    }

    /// `None` when the index file has never been written
    async fn read_index(&self) -> StoreResult<Option<UniqueIndex>> {
        match tokio::fs::read(self.index_path()).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_index(&self, index: &UniqueIndex) -> StoreResult<()> {
        let data = serde_json::to_vec_pretty(index)?;
        self.write_atomic(&self.index_path(), data).await
    }

    /// Whether `key` is held by a document other than `except`. An entry only counts when
    /// the document it points to still carries `key`, so entries left behind by an
    /// interrupted write are free. Read errors propagate rather than freeing the key.
    async fn held_by_other(
        &self,
        index: &UniqueIndex,
        field: CredentialField,
        key: &str,
        except: Option<&str>,
    ) -> StoreResult<bool> {
        let map = match field {
            CredentialField::Email => &index.email,
            CredentialField::Phone => &index.phone,
        };
        let Some(id) = map.get(key) else {
            return Ok(false);
        };
        if Some(id.as_str()) == except {
            return Ok(false);
        }
        match self.read_user(id).await {
            Ok(user) => Ok(match field {
                CredentialField::Email => user.email == key,
                CredentialField::Phone => user.phone == key,
            }),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read_user(&self, id: &str) -> StoreResult<User> {
        if !Self::valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        match tokio::fs::read(self.user_path(id)).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_user(&self, user: &User) -> StoreResult<()> {
        let data = serde_json::to_vec_pretty(user)?;
        self.write_atomic(&self.user_path(&user.user_id), data).await
    }

    /// 邮箱是否已被占用
    #[instrument(skip(self))]
    pub async fn exists_email(&self, email: &str) -> StoreResult<bool> {
        self.timed(async {
            let index = self.load_index().await?;
            self.held_by_other(&index, CredentialField::Email, email, None).await
        })
        .await
    }

    /// 手机号是否已被占用
    #[instrument(skip(self))]
    pub async fn exists_phone(&self, phone: &str) -> StoreResult<bool> {
        self.timed(async {
            let index = self.load_index().await?;
            self.held_by_other(&index, CredentialField::Phone, phone, None).await
        })
        .await
    }

    /// 插入新用户；唯一索引冲突返回 `DuplicateKey`
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn insert(&self, user: &User) -> StoreResult<()> {
        self.timed(async {
            let _guard = self.write_lock.lock().await;
            tokio::fs::create_dir_all(self.users_dir()).await?;

            if !Self::valid_id(&user.user_id) {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "invalid user id",
                )));
            }

            let mut index = self.load_index().await?;
            if self
                .held_by_other(&index, CredentialField::Email, &user.email, None)
                .await?
            {
                return Err(StoreError::DuplicateKey(CredentialField::Email));
            }
            if self
                .held_by_other(&index, CredentialField::Phone, &user.phone, None)
                .await?
            {
                return Err(StoreError::DuplicateKey(CredentialField::Phone));
            }

            // 先占用索引，再写文档；文档写入失败时释放
            index.email.insert(user.email.clone(), user.user_id.clone());
            index.phone.insert(user.phone.clone(), user.user_id.clone());
            self.save_index(&index).await?;

            if let Err(e) = self.write_user(user).await {
                index.email.remove(&user.email);
                index.phone.remove(&user.phone);
                if let Err(rollback) = self.save_index(&index).await {
                    warn!(error = %rollback, "failed to release unique index entries");
                }
                return Err(e);
            }
            debug!("user document inserted");
            Ok(())
        })
        .await
    }

    /// 按 ID 获取用户
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> StoreResult<User> {
        self.timed(self.read_user(id)).await
    }

    /// 通过邮箱查找；索引存在时只信任索引，仅在索引文件缺失时扫描目录
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.timed(async {
            let Some(index) = self.read_index().await? else {
                return Ok(self
                    .scan()
                    .await?
                    .into_iter()
                    .find(|user| user.email == email));
            };

            let Some(id) = index.email.get(email) else {
                return Ok(None);
            };
            match self.read_user(id).await {
                Ok(user) if user.email == email => Ok(Some(user)),
                Ok(_) | Err(StoreError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// 列出所有用户
    #[instrument(skip(self))]
    pub async fn list(&self) -> StoreResult<Vec<User>> {
        self.timed(self.scan()).await
    }

    async fn scan(&self) -> StoreResult<Vec<User>> {
        let dir = self.users_dir();
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if Self::valid_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }

        let loaded = join_all(ids.iter().map(|id| self.read_user(id))).await;
        let mut users = Vec::with_capacity(loaded.len());
        for (id, result) in ids.iter().zip(loaded) {
            match result {
                Ok(user) => users.push(user),
                // 扫描期间被移除的文档直接跳过
                Err(StoreError::NotFound(_)) => {}
                Err(StoreError::Serde(e)) => {
                    warn!(user_id = %id, error = %e, "skipping unreadable user document")
                }
                Err(e) => return Err(e),
            }
        }
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    /// 覆盖用户当前的 token 对（单文档原子写入）
    #[instrument(skip(self, access_token, refresh_token))]
    pub async fn update_tokens(
        &self,
        id: &str,
        access_token: &str,
        refresh_token: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.timed(async {
            let _guard = self.write_lock.lock().await;
            let mut user = self.read_user(id).await?;
            user.token = access_token.to_string();
            user.refresh_token = refresh_token.to_string();
            user.updated_at = updated_at;
            self.write_user(&user).await
        })
        .await
    }

    /// 仅当存储的 refresh token 仍为 `expected_refresh` 时覆盖 token 对；返回是否写入
    #[instrument(skip(self, expected_refresh, access_token, refresh_token))]
    pub async fn swap_tokens(
        &self,
        id: &str,
        expected_refresh: &str,
        access_token: &str,
        refresh_token: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.timed(async {
            let _guard = self.write_lock.lock().await;
            let mut user = self.read_user(id).await?;
            let current = user.refresh_token.as_bytes();
            if current.is_empty() || !bool::from(current.ct_eq(expected_refresh.as_bytes())) {
                return Ok(false);
            }
            user.token = access_token.to_string();
            user.refresh_token = refresh_token.to_string();
            user.updated_at = updated_at;
            self.write_user(&user).await?;
            Ok(true)
        })
        .await
    }

    /// 更新资料字段；手机号变更时重新校验唯一索引
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<User> {
        self.timed(async {
            let _guard = self.write_lock.lock().await;
            let mut user = self.read_user(id).await?;

            let phone_changed = user.phone != update.phone;
            let mut index = None;
            if phone_changed {
                let mut loaded = self.load_index().await?;
                if self
                    .held_by_other(&loaded, CredentialField::Phone, &update.phone, Some(id))
                    .await?
                {
                    return Err(StoreError::DuplicateKey(CredentialField::Phone));
                }
                loaded.phone.insert(update.phone.clone(), id.to_string());
                self.save_index(&loaded).await?;
                index = Some(loaded);
            }

            let old_phone = std::mem::replace(&mut user.phone, update.phone);
            user.first_name = update.first_name;
            user.last_name = update.last_name;
            user.updated_at = updated_at;
            if let Err(e) = self.write_user(&user).await {
                // 文档未更新，释放刚占用的新手机号
                if let Some(mut index) = index {
                    index.phone.remove(&user.phone);
                    if let Err(rollback) = self.save_index(&index).await {
                        warn!(error = %rollback, "failed to release phone index entry");
                    }
                }
                return Err(e);
            }

            if let Some(mut index) = index {
                if index.phone.get(&old_phone).map(|owner| owner == id).unwrap_or(false) {
                    index.phone.remove(&old_phone);
                    if let Err(e) = self.save_index(&index).await {
                        warn!(error = %e, "failed to release previous phone index entry");
                    }
                }
            }
            Ok(user)
        })
        .await
    }
}
