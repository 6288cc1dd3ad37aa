use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{Credentials, MessageResponse, PublicUser},
        extractors::AuthUser,
        password::{hash_password, policy_violation, verify_password},
        repo::CreateUserError,
    },
    error::{AppError, AppResult, FieldError},
    state::AppState,
};

const MAX_USERNAME_LEN: usize = 64;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_me))
}

fn validate_registration(username: &str, password: &str) -> Result<(), AppError> {
    let mut details = Vec::new();
    if username.is_empty() {
        details.push(FieldError::new("username", "Username is required"));
    } else if username.chars().count() > MAX_USERNAME_LEN {
        details.push(FieldError::new(
            "username",
            format!("Username must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    if let Some(msg) = policy_violation(password) {
        details.push(FieldError::new("password", msg));
    }
    if details.is_empty() {
        Ok(())
    } else {
        Err(AppError::invalid_fields("Invalid registration data", details))
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), token))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(state.config.session.cookie_secure)
        .max_age(state.session_ttl())
        .build()
}

/// Destroys whatever session the jar carries and queues the cookie removal.
async fn end_session(state: &AppState, jar: CookieJar) -> AppResult<CookieJar> {
    let name = state.config.session.cookie_name.clone();
    if let Some(token) = jar.get(&name).map(|c| c.value().to_owned()) {
        state.sessions.destroy(&token).await?;
    }
    Ok(jar.remove(Cookie::build((name, "")).path("/")))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult<(StatusCode, CookieJar, Json<PublicUser>)> {
    let Json(payload) = payload?;
    let username = payload.username.trim();
    validate_registration(username, &payload.password)?;

    let hash = hash_password(&payload.password)?;
    let user = match state.users.create(username, &hash).await {
        Ok(u) => u,
        Err(CreateUserError::UsernameTaken) => {
            warn!(%username, "username already taken");
            return Err(AppError::invalid_fields(
                "Username already taken",
                vec![FieldError::new("username", "Username already taken")],
            ));
        }
        Err(CreateUserError::Storage(e)) => return Err(e.into()),
    };

    let jar = end_session(&state, jar).await?;
    let token = state.sessions.create(user.id, state.session_ttl()).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(&state, token)),
        Json(user.into()),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult<(CookieJar, Json<PublicUser>)> {
    let Json(payload) = payload?;
    let username = payload.username.trim();

    let Some(user) = state.users.find_by_username(username).await? else {
        warn!(%username, "login unknown username");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let jar = end_session(&state, jar).await?;
    let token = state.sessions.create(user.id, state.session_ttl()).await?;

    info!(user_id = %user.id, "user logged in");
    Ok((jar.add(session_cookie(&state, token)), Json(user.into())))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let jar = end_session(&state, jar).await?;
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(%user_id, "session refers to a missing user");
        AppError::Unauthorized("User not found".into())
    })?;
    Ok(Json(user.into()))
}
