use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::extract::AuthUser;
use crate::errors::AppError;
use crate::models::asset::Asset;
use crate::models::watchlist::{Watchlist, WatchlistItem};
use crate::state::AppState;
use crate::watchlists::caps_for;

/// GET /api/v1/watchlists
pub async fn handle_list_watchlists(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Watchlist>>, AppError> {
    let lists: Vec<Watchlist> =
        sqlx::query_as("SELECT * FROM watchlists WHERE user_id = $1 ORDER BY created_at")
            .bind(auth.user.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(lists))
}

#[derive(Debug, Serialize)]
pub struct WatchlistDetail {
    pub watchlist: Watchlist,
    pub items: Vec<WatchlistItem>,
}

/// GET /api/v1/watchlists/:id
pub async fn handle_get_watchlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<WatchlistDetail>, AppError> {
    let watchlist = owned_watchlist(&state, &auth, id).await?;
    let items: Vec<WatchlistItem> =
        sqlx::query_as("SELECT * FROM watchlist_items WHERE watchlist_id = $1 ORDER BY created_at")
            .bind(id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(WatchlistDetail { watchlist, items }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct WatchlistNameRequest {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub name: String,
}

/// POST /api/v1/watchlists
pub async fn handle_create_watchlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<WatchlistNameRequest>,
) -> Result<(StatusCode, Json<Watchlist>), AppError> {
    req.validate().map_err(AppError::from_validation)?;

    let caps = caps_for(auth.user.active_tier(Utc::now()), auth.user.is_admin());
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM watchlists WHERE user_id = $1")
        .bind(auth.user.id)
        .fetch_one(&state.db)
        .await?;
    if count >= caps.lists as i64 {
        return Err(AppError::TierLimit(format!(
            "Your tier allows {} watchlist(s); upgrade for more",
            caps.lists
        )));
    }

    let watchlist: Watchlist = sqlx::query_as(
        r#"
        INSERT INTO watchlists (id, user_id, name, created_at, updated_at)
        VALUES (gen_random_uuid(), $1, $2, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(auth.user.id)
    .bind(req.name.trim())
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(watchlist)))
}

/// PATCH /api/v1/watchlists/:id
pub async fn handle_rename_watchlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<WatchlistNameRequest>,
) -> Result<Json<Watchlist>, AppError> {
    req.validate().map_err(AppError::from_validation)?;
    owned_watchlist(&state, &auth, id).await?;

    let watchlist: Watchlist = sqlx::query_as(
        "UPDATE watchlists SET name = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(req.name.trim())
    .bind(id)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(watchlist))
}

/// DELETE /api/v1/watchlists/:id
pub async fn handle_delete_watchlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    owned_watchlist(&state, &auth, id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM watchlist_items WHERE watchlist_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM watchlists WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 5, max = 32, message = "must be 5-32 characters"))]
    pub symbol: String,
}

/// POST /api/v1/watchlists/:id/items
pub async fn handle_add_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<WatchlistItem>), AppError> {
    req.validate().map_err(AppError::from_validation)?;
    owned_watchlist(&state, &auth, id).await?;
    let symbol = req.symbol.to_uppercase();

    let asset: Option<Asset> = sqlx::query_as("SELECT * FROM assets WHERE symbol = $1")
        .bind(&symbol)
        .fetch_optional(&state.db)
        .await?;
    let asset =
        asset.ok_or_else(|| AppError::Validation(format!("symbol: {symbol} is not tracked")))?;

    let existing: Option<WatchlistItem> = sqlx::query_as(
        "SELECT * FROM watchlist_items WHERE watchlist_id = $1 AND asset_id = $2",
    )
    .bind(id)
    .bind(asset.id)
    .fetch_optional(&state.db)
    .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "{symbol} is already on this watchlist"
        )));
    }

    let caps = caps_for(auth.user.active_tier(Utc::now()), auth.user.is_admin());
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM watchlist_items WHERE watchlist_id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if count >= caps.items_per_list as i64 {
        return Err(AppError::TierLimit(format!(
            "Your tier allows {} items per watchlist; upgrade for more",
            caps.items_per_list
        )));
    }

    let item: WatchlistItem = sqlx::query_as(
        r#"
        INSERT INTO watchlist_items (id, watchlist_id, asset_id, symbol, created_at)
        VALUES (gen_random_uuid(), $1, $2, $3, NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(asset.id)
    .bind(&symbol)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// DELETE /api/v1/watchlists/:id/items/:item_id
pub async fn handle_remove_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    owned_watchlist(&state, &auth, id).await?;

    let deleted =
        sqlx::query("DELETE FROM watchlist_items WHERE id = $1 AND watchlist_id = $2")
            .bind(item_id)
            .bind(id)
            .execute(&state.db)
            .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Item {item_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Loads a watchlist and checks it belongs to the caller. Someone else's
/// list reads as missing, not forbidden.
async fn owned_watchlist(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
) -> Result<Watchlist, AppError> {
    let watchlist: Option<Watchlist> =
        sqlx::query_as("SELECT * FROM watchlists WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(auth.user.id)
            .fetch_optional(&state.db)
            .await?;
    watchlist.ok_or_else(|| AppError::NotFound(format!("Watchlist {id} not found")))
}
