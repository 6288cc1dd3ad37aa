use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::{sync::watch, sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Server-side session storage keyed by the opaque cookie token.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create(&self, user_id: Uuid, ttl: time::Duration) -> anyhow::Result<String>;
    /// Expired sessions resolve to `None` even before the sweeper removes them.
    async fn lookup(&self, token: &str) -> anyhow::Result<Option<Uuid>>;
    async fn destroy(&self, token: &str) -> anyhow::Result<()>;
    async fn sweep_expired(&self) -> anyhow::Result<u64>;
}

pub fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

#[derive(Clone)]
pub struct PgSessionRepo {
    db: PgPool,
}

impl PgSessionRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn create(&self, user_id: Uuid, ttl: time::Duration) -> anyhow::Result<String> {
        let token = new_token();
        let expires_at = OffsetDateTime::now_utc() + ttl;
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        debug!(%user_id, "session created");
        Ok(token)
    }

    async fn lookup(&self, token: &str) -> anyhow::Result<Option<Uuid>> {
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT user_id
              FROM sessions
             WHERE token = $1 AND expires_at > now()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    async fn destroy(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}

struct MemorySession {
    user_id: Uuid,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
pub struct MemorySessionRepo {
    sessions: RwLock<HashMap<String, MemorySession>>,
}

impl MemorySessionRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepo for MemorySessionRepo {
    async fn create(&self, user_id: Uuid, ttl: time::Duration) -> anyhow::Result<String> {
        let token = new_token();
        let session = MemorySession {
            user_id,
            expires_at: OffsetDateTime::now_utc() + ttl,
        };
        self.sessions.write().await.insert(token.clone(), session);
        Ok(token)
    }

    async fn lookup(&self, token: &str) -> anyhow::Result<Option<Uuid>> {
        let now = OffsetDateTime::now_utc();
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(token)
            .filter(|s| s.expires_at > now)
            .map(|s| s.user_id))
    }

    async fn destroy(&self, token: &str) -> anyhow::Result<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn sweep_expired(&self) -> anyhow::Result<u64> {
        let now = OffsetDateTime::now_utc();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

/// Periodically deletes expired sessions until `shutdown` flips to true.
pub fn spawn_sweeper(
    sessions: Arc<dyn SessionRepo>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match sessions.sweep_expired().await {
                        Ok(0) => {}
                        Ok(n) => info!(removed = n, "expired sessions swept"),
                        Err(e) => warn!(error = %e, "session sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("session sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}
