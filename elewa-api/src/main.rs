mod app;

use anyhow::{bail, Context};
use app::{app_router, AppState};
use dotenvy::dotenv;
use elewa_core::{AuthConfig, UserManager};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone)]
struct ApiConfig {
    bind: SocketAddr,
    data_dir: PathBuf,
    /// 传入核心层的认证配置（签名密钥、TTL、bcrypt cost、存储超时）
    auth: AuthConfig,
    /// CORS 允许的来源列表（空则允许所有）
    cors_origins: Vec<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", key, e)),
        _ => Ok(None),
    }
}

impl ApiConfig {
    fn from_env() -> anyhow::Result<Self> {
        // ELEWA_BIND 优先，其次 PORT
        let bind = match env_parse::<SocketAddr>("ELEWA_BIND")? {
            Some(addr) => addr,
            None => {
                let port = env_parse::<u16>("PORT")?.unwrap_or(9000);
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let data_dir = env::var("ELEWA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        // JWT 密钥；未配置时本次运行使用随机值（重启后旧 token 全部失效）
        let jwt_secret = match env::var("ELEWA_JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret.trim().to_string(),
            _ => {
                warn!("ELEWA_JWT_SECRET not set; generating a random secret for this run");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
        };
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("ELEWA_JWT_SECRET is too short (<{MIN_SECRET_LEN}); use a strong random value");
        }

        let mut auth = AuthConfig::new(jwt_secret);
        if let Ok(issuer) = env::var("ELEWA_JWT_ISSUER") {
            auth = auth.with_issuer(issuer);
        }
        let access_ttl = env_parse::<i64>("ELEWA_ACCESS_TTL_SECS")?.unwrap_or(auth.access_token_ttl);
        let refresh_ttl =
            env_parse::<i64>("ELEWA_REFRESH_TTL_SECS")?.unwrap_or(auth.refresh_token_ttl);
        auth = auth.with_ttl(access_ttl, refresh_ttl);
        if let Some(cost) = env_parse::<u32>("ELEWA_BCRYPT_COST")? {
            auth = auth.with_bcrypt_cost(cost);
        }
        if let Some(secs) = env_parse::<u64>("ELEWA_STORAGE_TIMEOUT_SECS")? {
            auth = auth.with_storage_timeout(Duration::from_secs(secs.max(1)));
        }
        if let Some(leeway) = env_parse::<i64>("ELEWA_TOKEN_LEEWAY_SECS")? {
            auth = auth.with_leeway(leeway);
        }
        auth.validate()
            .context("invalid ELEWA_ACCESS_TTL_SECS / ELEWA_REFRESH_TTL_SECS")?;

        // CORS 允许的来源，逗号分隔；空或 "*" 表示允许所有
        let cors_origins = env::var("ELEWA_CORS_ORIGINS")
            .ok()
            .map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed == "*" {
                    vec![]
                } else {
                    trimmed
                        .split(',')
                        .filter(|t| !t.trim().is_empty())
                        .map(|t| t.trim().to_string())
                        .collect()
                }
            })
            .unwrap_or_default();

        Ok(Self {
            bind,
            data_dir,
            auth,
            cors_origins,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 优先读取 .env（若存在）
    let _ = dotenv();
    init_tracing();

    let config = ApiConfig::from_env()?;
    info!("starting API on {}", config.bind);

    let users = Arc::new(UserManager::new(config.data_dir.clone(), config.auth.clone()));
    users
        .ensure_dirs()
        .with_context(|| format!("failed to prepare data dir {}", config.data_dir.display()))?;

    let state = AppState { users };

    let app = app_router(state, config.cors_origins.clone());
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = env::var("ELEWA_LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}
