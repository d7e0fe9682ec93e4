use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::extract::{AdminUser, AuthUser};
use crate::errors::AppError;
use crate::models::asset::Asset;
use crate::models::suggestion::AssetSuggestion;
use crate::state::AppState;
use crate::suggestions::base_from_symbol;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSuggestionRequest {
    #[validate(length(min = 2, max = 32, message = "must be 2-32 characters"))]
    pub symbol: String,
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub note: Option<String>,
}

/// POST /api/v1/suggestions — one pending suggestion per symbol per user.
pub async fn handle_create_suggestion(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateSuggestionRequest>,
) -> Result<(StatusCode, Json<AssetSuggestion>), AppError> {
    req.validate().map_err(AppError::from_validation)?;
    let symbol = req.symbol.to_uppercase();

    let pending: Option<AssetSuggestion> = sqlx::query_as(
        "SELECT * FROM asset_suggestions WHERE user_id = $1 AND symbol = $2 AND status = 'pending'",
    )
    .bind(auth.user.id)
    .bind(&symbol)
    .fetch_optional(&state.db)
    .await?;
    if pending.is_some() {
        return Err(AppError::Conflict(format!(
            "You already have a pending suggestion for {symbol}"
        )));
    }

    let suggestion: AssetSuggestion = sqlx::query_as(
        r#"
        INSERT INTO asset_suggestions (id, user_id, symbol, note, status, created_at)
        VALUES (gen_random_uuid(), $1, $2, $3, 'pending', NOW())
        RETURNING *
        "#,
    )
    .bind(auth.user.id)
    .bind(&symbol)
    .bind(req.note.as_deref())
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(suggestion)))
}

/// GET /api/v1/suggestions — the caller's suggestions, newest first.
pub async fn handle_list_my_suggestions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<AssetSuggestion>>, AppError> {
    let suggestions: Vec<AssetSuggestion> = sqlx::query_as(
        "SELECT * FROM asset_suggestions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(suggestions))
}

#[derive(Debug, Deserialize)]
pub struct AdminSuggestionQuery {
    pub status: Option<String>,
}

/// GET /api/v1/admin/suggestions — review queue, defaults to pending.
pub async fn handle_admin_list_suggestions(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<AdminSuggestionQuery>,
) -> Result<Json<Vec<AssetSuggestion>>, AppError> {
    let status = params.status.unwrap_or_else(|| "pending".to_string());
    let suggestions: Vec<AssetSuggestion> = sqlx::query_as(
        "SELECT * FROM asset_suggestions WHERE status = $1 ORDER BY created_at",
    )
    .bind(&status)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(suggestions))
}

/// POST /api/v1/admin/suggestions/:id/approve — marks the suggestion
/// approved and seeds a discovered asset when the symbol is new.
pub async fn handle_admin_approve_suggestion(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AssetSuggestion>, AppError> {
    let suggestion = pending_suggestion(&state, id).await?;

    let mut tx = state.db.begin().await?;
    let updated: AssetSuggestion = sqlx::query_as(
        "UPDATE asset_suggestions SET status = 'approved', reviewed_by = $1 WHERE id = $2 RETURNING *",
    )
    .bind(admin.0.user.id)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    let existing: Option<Asset> = sqlx::query_as("SELECT * FROM assets WHERE symbol = $1")
        .bind(&suggestion.symbol)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_none() {
        sqlx::query(
            r#"
            INSERT INTO assets
                (id, symbol, base_symbol, status, admin_complete, created_at, updated_at)
            VALUES (gen_random_uuid(), $1, $2, 'discovered', FALSE, NOW(), NOW())
            ON CONFLICT (symbol) DO NOTHING
            "#,
        )
        .bind(&suggestion.symbol)
        .bind(base_from_symbol(&suggestion.symbol))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(Json(updated))
}

/// POST /api/v1/admin/suggestions/:id/reject
pub async fn handle_admin_reject_suggestion(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AssetSuggestion>, AppError> {
    pending_suggestion(&state, id).await?;
    let updated: AssetSuggestion = sqlx::query_as(
        "UPDATE asset_suggestions SET status = 'rejected', reviewed_by = $1 WHERE id = $2 RETURNING *",
    )
    .bind(admin.0.user.id)
    .bind(id)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(updated))
}

async fn pending_suggestion(state: &AppState, id: Uuid) -> Result<AssetSuggestion, AppError> {
    let suggestion: Option<AssetSuggestion> =
        sqlx::query_as("SELECT * FROM asset_suggestions WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db)
            .await?;
    let suggestion =
        suggestion.ok_or_else(|| AppError::NotFound(format!("Suggestion {id} not found")))?;
    if suggestion.status != "pending" {
        return Err(AppError::Conflict(
            "This suggestion has already been reviewed".to_string(),
        ));
    }
    Ok(suggestion)
}
