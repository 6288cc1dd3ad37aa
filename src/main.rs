use std::time::Duration;

use tokio::sync::watch;

mod analytics;
mod app;
mod auth;
mod config;
mod entries;
mod error;
mod state;

use crate::{auth::sessions::spawn_sweeper, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "eunoia=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let sweep_every = Duration::from_secs(config.session.sweep_seconds.max(1));
    let state = AppState::init(config).await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(state.sessions.clone(), sweep_every, stop_rx);

    let app = app::build_app(state.clone());
    let served = app::serve(app, &state).await;

    let _ = stop_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "session sweeper task failed");
    }
    state.close().await;

    served
}
