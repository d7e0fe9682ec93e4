//! Axum extractors for authenticated requests. A valid JWT alone is not
//! enough: the session it names must still be active, so revoking a device
//! takes effect on the next request.

use axum::{async_trait, extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use uuid::Uuid;

use crate::auth::tokens;
use crate::errors::AppError;
use crate::models::session::UserSession;
use crate::models::user::User;
use crate::state::AppState;

pub struct AuthUser {
    pub user: User,
    pub session_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims =
            tokens::verify(&state.config.jwt_secret, token).map_err(|_| AppError::Unauthorized)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;
        let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AppError::Unauthorized)?;

        let session: Option<UserSession> = sqlx::query_as(
            "SELECT * FROM user_sessions WHERE id = $1 AND user_id = $2 AND is_active = TRUE",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?;
        if session.is_none() {
            return Err(AppError::Unauthorized);
        }

        sqlx::query("UPDATE user_sessions SET last_seen_at = NOW() WHERE id = $1")
            .bind(session_id)
            .execute(&state.db)
            .await?;

        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser { user, session_id })
    }
}

/// An `AuthUser` whose role is admin.
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        if !auth.user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(auth))
    }
}
