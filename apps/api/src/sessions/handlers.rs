use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::extract::AuthUser;
use crate::errors::AppError;
use crate::models::session::UserSession;
use crate::state::AppState;

/// GET /api/v1/sessions — the caller's active devices, newest first.
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserSession>>, AppError> {
    let sessions: Vec<UserSession> = sqlx::query_as(
        r#"
        SELECT * FROM user_sessions
        WHERE user_id = $1 AND is_active = TRUE
        ORDER BY last_seen_at DESC
        "#,
    )
    .bind(auth.user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(sessions))
}

/// DELETE /api/v1/sessions/:id — revoke one device.
pub async fn handle_revoke_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let updated = sqlx::query(
        "UPDATE user_sessions SET is_active = FALSE WHERE id = $1 AND user_id = $2 AND is_active",
    )
    .bind(id)
    .bind(auth.user.id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Session {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/revoke-others — sign out every other device.
pub async fn handle_revoke_other_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    sqlx::query(
        "UPDATE user_sessions SET is_active = FALSE WHERE user_id = $1 AND id <> $2 AND is_active",
    )
    .bind(auth.user.id)
    .bind(auth.session_id)
    .execute(&state.db)
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
