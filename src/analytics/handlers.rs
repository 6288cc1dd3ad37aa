use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::{
    analytics::{
        dto::{Insights, InsightsQuery},
        services::summarize,
    },
    auth::extractors::AuthUser,
    entries::repo_types::entry_date,
    error::{AppError, AppResult, FieldError},
    state::AppState,
};

pub fn analytics_routes() -> Router<AppState> {
    Router::new().route("/analytics", get(get_insights))
}

#[instrument(skip(state))]
pub async fn get_insights(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<InsightsQuery>,
) -> AppResult<Json<Insights>> {
    let today = match q.today.as_deref() {
        Some(raw) => entry_date::parse(raw).map_err(|_| {
            AppError::invalid_fields(
                "Invalid date",
                vec![FieldError::new("today", "expected a YYYY-MM-DD date")],
            )
        })?,
        None => OffsetDateTime::now_utc().date(),
    };

    let entries = state.entries.summaries_for_user(user_id).await?;
    let insights = summarize(&entries, today);
    debug!(%user_id, entries = entries.len(), streak = insights.current_streak, "insights computed");
    Ok(Json(insights))
}
