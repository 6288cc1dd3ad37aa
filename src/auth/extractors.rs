use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Resolves the session cookie to the authenticated user id.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.session.cookie_name)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

        match state.sessions.lookup(&token).await? {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => {
                debug!("unknown or expired session");
                Err(AppError::Unauthorized("Session expired".into()))
            }
        }
    }
}
