use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};

pub mod dto;
pub mod handlers;
pub mod import;
pub mod media;
pub mod patch;
pub mod repo;
pub mod repo_types;

/// Entry routes accept inline photos and videos, so they get a larger body cap.
pub fn router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::entry_routes())
        .layer(DefaultBodyLimit::max(max_body_bytes))
}
