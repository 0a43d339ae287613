use std::{sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::config::{AppConfig, DbConfig, StoreBackend};
use crate::users::{memory::MemoryUserStore, pg::PgUserStore, store::UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match config.db.backend {
            StoreBackend::Postgres => {
                let db = connect_with_retry(&config.db).await?;
                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    warn!(error = %e, "migration failed; continuing with existing schema");
                }
                Arc::new(PgUserStore::new(db, config.db.timeout())) as Arc<dyn UserStore>
            }
            StoreBackend::Memory => {
                warn!("using in-memory user store; data is lost on restart");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        Ok(Self::from_parts(store, config))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::JwtConfig;

        let config = Arc::new(AppConfig {
            db: DbConfig {
                backend: StoreBackend::Memory,
                database_url: None,
                timeout_secs: 3,
                connect_attempts: 1,
                connect_backoff_secs: 0,
            },
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 15,
                refresh_ttl_minutes: 60,
            },
        });
        Self::from_parts(Arc::new(MemoryUserStore::new()), config)
    }
}

/// Postgres is often still starting when the service comes up; back off and retry.
async fn connect_with_retry(cfg: &DbConfig) -> anyhow::Result<PgPool> {
    let url = cfg
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let attempts = cfg.connect_attempts.max(1);

    let mut attempt = 1;
    loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(cfg.timeout())
            .connect(url)
            .await
        {
            Ok(db) => {
                info!(attempt, "connected to postgres");
                return Ok(db);
            }
            Err(e) if attempt < attempts => {
                warn!(error = %e, attempt, "postgres not yet ready; backing off");
                tokio::time::sleep(Duration::from_secs(cfg.connect_backoff_secs)).await;
                attempt += 1;
            }
            Err(e) => return Err(e).context("connect to database"),
        }
    }
}
