use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    entries::{
        dto::{CreateEntryRequest, ImportSummary, UpdateEntryRequest},
        import::{parse_journal_csv, plan_import},
        repo_types::{entry_date, JournalEntry},
    },
    error::{AppError, AppResult, FieldError},
    state::AppState,
};

pub fn entry_routes() -> Router<AppState> {
    Router::new()
        .route("/entries", get(list_entries).post(create_entry))
        .route("/entries/import", post(import_entries))
        .route("/entries/date/:date", get(get_entry_by_date))
        .route(
            "/entries/:id",
            get(get_entry).patch(update_entry).delete(delete_entry),
        )
}

/// Loads an entry and checks it belongs to `user_id`.
async fn load_owned(state: &AppState, user_id: Uuid, id: Uuid) -> AppResult<JournalEntry> {
    let entry = state
        .entries
        .get_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Entry"))?;
    if entry.user_id != user_id {
        warn!(%user_id, entry_id = %id, owner = %entry.user_id, "cross-user entry access");
        return Err(AppError::Forbidden);
    }
    Ok(entry)
}

/// Ids that are not UUIDs cannot exist.
fn entry_id(path: Result<Path<Uuid>, PathRejection>) -> AppResult<Uuid> {
    path.map(|Path(id)| id).map_err(|_| AppError::NotFound("Entry"))
}

#[instrument(skip(state))]
pub async fn list_entries(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<JournalEntry>>> {
    let entries = state.entries.list_for_user(user_id).await?;
    Ok(Json(entries))
}

#[instrument(skip(state, path))]
pub async fn get_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<JournalEntry>> {
    let id = entry_id(path)?;
    Ok(Json(load_owned(&state, user_id, id).await?))
}

#[instrument(skip(state))]
pub async fn get_entry_by_date(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(raw): Path<String>,
) -> AppResult<Json<JournalEntry>> {
    let date = entry_date::parse(&raw).map_err(|_| {
        AppError::invalid_fields(
            "Invalid date",
            vec![FieldError::new("date", "expected a YYYY-MM-DD date")],
        )
    })?;
    let entry = state
        .entries
        .find_by_date(user_id, date)
        .await?
        .ok_or(AppError::NotFound("Entry"))?;
    Ok(Json(entry))
}

#[instrument(skip(state, payload))]
pub async fn create_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateEntryRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(payload) = payload?;
    let new_entry = payload.validate()?;
    let entry = state.entries.create(user_id, new_entry).await?;

    info!(%user_id, entry_id = %entry.id, date = %entry.date, "entry created");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/entries/{}", entry.id))],
        Json(entry),
    ))
}

#[instrument(skip(state, path, payload))]
pub async fn update_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateEntryRequest>, JsonRejection>,
) -> AppResult<Json<JournalEntry>> {
    let id = entry_id(path)?;
    load_owned(&state, user_id, id).await?;

    let Json(payload) = payload?;
    let patch = payload.validate()?;
    let entry = state
        .entries
        .update(id, patch)
        .await?
        .ok_or(AppError::NotFound("Entry"))?;

    info!(%user_id, entry_id = %id, "entry updated");
    Ok(Json(entry))
}

#[instrument(skip(state, path))]
pub async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<StatusCode> {
    let id = entry_id(path)?;
    load_owned(&state, user_id, id).await?;
    if !state.entries.delete(id).await? {
        return Err(AppError::NotFound("Entry"));
    }
    info!(%user_id, entry_id = %id, "entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /entries/import with a CSV export body. New days are created, days
/// whose entries have no reflection are filled in, the rest are left alone.
/// Everything is written in one batch.
#[instrument(skip(state, body))]
pub async fn import_entries(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let parsed = parse_journal_csv(&body).map_err(|e| {
        AppError::invalid_fields("Invalid CSV", vec![FieldError::new("body", e.to_string())])
    })?;

    let existing = state.entries.summaries_for_user(user_id).await?;
    let plan = plan_import(parsed, &existing);
    let summary = plan.summary();
    state
        .entries
        .write_batch(user_id, plan.create, plan.fill)
        .await?;

    info!(
        %user_id,
        imported = summary.imported,
        updated = summary.updated,
        skipped = summary.skipped,
        "journal imported"
    );
    Ok(Json(summary))
}
