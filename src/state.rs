use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::auth::repo::{MemoryUserRepo, PgUserRepo, UserRepo};
use crate::auth::sessions::{MemorySessionRepo, PgSessionRepo, SessionRepo};
use crate::config::{AppConfig, StorageBackend};
use crate::entries::repo::{EntryRepo, MemoryEntryRepo, PgEntryRepo};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub entries: Arc<dyn EntryRepo>,
    pub sessions: Arc<dyn SessionRepo>,
    db: Option<PgPool>,
}

impl AppState {
    /// Opens the configured storage backend. Pair with [`AppState::close`].
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        match config.backend {
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres backend")?;
                let db = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;

                info!(max_connections = config.max_connections, "postgres storage ready");
                Ok(Self::from_pool(db, config))
            }
            StorageBackend::Memory => {
                warn!("using in-memory storage; data is lost on shutdown");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn from_pool(db: PgPool, config: Arc<AppConfig>) -> Self {
        Self {
            config,
            users: Arc::new(PgUserRepo::new(db.clone())),
            entries: Arc::new(PgEntryRepo::new(db.clone())),
            sessions: Arc::new(PgSessionRepo::new(db.clone())),
            db: Some(db),
        }
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            users: Arc::new(MemoryUserRepo::new()),
            entries: Arc::new(MemoryEntryRepo::new()),
            sessions: Arc::new(MemorySessionRepo::new()),
            db: None,
        }
    }

    pub fn session_ttl(&self) -> time::Duration {
        time::Duration::minutes(self.config.session.ttl_minutes)
    }

    pub async fn close(&self) {
        if let Some(db) = &self.db {
            db.close().await;
            info!("database pool closed");
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::in_memory(Arc::new(AppConfig::memory()))
    }
}
