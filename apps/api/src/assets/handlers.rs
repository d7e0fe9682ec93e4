use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::assets::discovery::{discover_assets, DiscoverySummary};
use crate::assets::refresh::{refresh_single_asset, run_refresh_cycle};
use crate::auth::extract::AdminUser;
use crate::errors::AppError;
use crate::models::asset::{Asset, AssetStatus};
use crate::state::AppState;

/// GET /api/v1/assets — publicly visible assets (complete or verified).
pub async fn handle_list_public_assets(
    State(state): State<AppState>,
) -> Result<Json<Vec<Asset>>, AppError> {
    let assets: Vec<Asset> = sqlx::query_as(
        "SELECT * FROM assets WHERE status IN ('complete', 'verified') ORDER BY symbol",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(assets))
}

/// GET /api/v1/assets/:symbol
pub async fn handle_get_asset(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Asset>, AppError> {
    let symbol = symbol.to_uppercase();
    let asset: Option<Asset> = sqlx::query_as("SELECT * FROM assets WHERE symbol = $1")
        .bind(&symbol)
        .fetch_optional(&state.db)
        .await?;
    asset
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Asset {symbol} not found")))
}

#[derive(Debug, Deserialize)]
pub struct AdminAssetQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AdminAssetList {
    pub assets: Vec<Asset>,
    pub page: u32,
    pub per_page: u32,
}

/// GET /api/v1/admin/assets — paginated, filterable by status and symbol
/// substring.
pub async fn handle_admin_list_assets(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<AdminAssetQuery>,
) -> Result<Json<AdminAssetList>, AppError> {
    if let Some(status) = params.status.as_deref() {
        if AssetStatus::parse(status).is_none() {
            return Err(AppError::Validation(format!(
                "status: '{status}' is not a valid asset status"
            )));
        }
    }
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(50).clamp(1, 200);
    let offset = (page - 1) as i64 * per_page as i64;
    let search = params
        .search
        .map(|s| format!("%{}%", s.to_uppercase()))
        .unwrap_or_else(|| "%".to_string());

    let assets: Vec<Asset> = sqlx::query_as(
        r#"
        SELECT * FROM assets
        WHERE ($1::text IS NULL OR status = $1)
          AND symbol LIKE $2
        ORDER BY symbol
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(params.status.as_deref())
    .bind(&search)
    .bind(per_page as i64)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(AdminAssetList {
        assets,
        page,
        per_page,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssetRequest {
    #[validate(length(min = 5, max = 32, message = "must be 5-32 characters"))]
    pub symbol: String,
    #[validate(length(min = 1, max = 16, message = "must be 1-16 characters"))]
    pub base_symbol: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub explorer_url: Option<String>,
    pub coingecko_id: Option<String>,
    #[serde(default)]
    pub admin_complete: bool,
}

/// POST /api/v1/admin/assets
pub async fn handle_admin_create_asset(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<CreateAssetRequest>,
) -> Result<(StatusCode, Json<Asset>), AppError> {
    req.validate().map_err(AppError::from_validation)?;
    let symbol = req.symbol.to_uppercase();

    let existing: Option<Asset> = sqlx::query_as("SELECT * FROM assets WHERE symbol = $1")
        .bind(&symbol)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!("Asset {symbol} already exists")));
    }

    let asset: Asset = sqlx::query_as(
        r#"
        INSERT INTO assets
            (id, symbol, base_symbol, name, description, website_url, explorer_url,
             coingecko_id, status, admin_complete, created_at, updated_at)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, 'discovered', $8, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(&symbol)
    .bind(req.base_symbol.to_uppercase())
    .bind(req.name.as_deref())
    .bind(req.description.as_deref())
    .bind(req.website_url.as_deref())
    .bind(req.explorer_url.as_deref())
    .bind(req.coingecko_id.as_deref())
    .bind(req.admin_complete)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(asset)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssetRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_data_url: Option<String>,
    pub website_url: Option<String>,
    pub explorer_url: Option<String>,
    pub coingecko_id: Option<String>,
    /// discovered | complete | verified
    pub status: Option<String>,
    pub admin_complete: Option<bool>,
}

/// PATCH /api/v1/admin/assets/:id — partial update; absent fields keep their
/// current value. Setting status to `verified` shields the row from future
/// refresh overwrites.
pub async fn handle_admin_update_asset(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAssetRequest>,
) -> Result<Json<Asset>, AppError> {
    let current: Asset = sqlx::query_as("SELECT * FROM assets WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset {id} not found")))?;

    let status = match req.status {
        Some(s) => AssetStatus::parse(&s)
            .ok_or_else(|| {
                AppError::Validation(format!("status: '{s}' is not a valid asset status"))
            })?
            .as_str()
            .to_string(),
        None => current.status.clone(),
    };

    let asset: Asset = sqlx::query_as(
        r#"
        UPDATE assets
        SET name = $1, description = $2, logo_data_url = $3, website_url = $4,
            explorer_url = $5, coingecko_id = $6, status = $7, admin_complete = $8,
            updated_at = NOW()
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(req.name.or(current.name))
    .bind(req.description.or(current.description))
    .bind(req.logo_data_url.or(current.logo_data_url))
    .bind(req.website_url.or(current.website_url))
    .bind(req.explorer_url.or(current.explorer_url))
    .bind(req.coingecko_id.or(current.coingecko_id))
    .bind(&status)
    .bind(req.admin_complete.unwrap_or(current.admin_complete))
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(asset))
}

/// DELETE /api/v1/admin/assets/:id
pub async fn handle_admin_delete_asset(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = sqlx::query("DELETE FROM assets WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Asset {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/assets/:id/refresh — force-refresh one asset inline
/// and report the tagged outcome.
pub async fn handle_admin_refresh_asset(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let asset: Asset = sqlx::query_as("SELECT * FROM assets WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset {id} not found")))?;

    match refresh_single_asset(&state.db, &state.coingecko, &asset, true).await {
        Ok(()) => Ok(Json(json!({ "result": "success" }))),
        Err(reason) => Ok(Json(json!({ "result": "failure", "reason": reason }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerRefreshRequest {
    pub reason: Option<String>,
}

/// POST /api/v1/admin/assets/refresh — kick off a background refresh cycle.
/// 409 when one is already running.
pub async fn handle_admin_trigger_refresh(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<TriggerRefreshRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    if state.refresh.is_running() {
        return Err(AppError::Conflict(
            "A refresh cycle is already running".to_string(),
        ));
    }

    let reason = req
        .reason
        .unwrap_or_else(|| format!("manual ({})", admin.0.user.id));
    let db = state.db.clone();
    let coingecko = state.coingecko.clone();
    let tracker = state.refresh.clone();
    tokio::spawn(async move {
        if let Err(e) = run_refresh_cycle(&db, &coingecko, &tracker, &reason).await {
            tracing::warn!("Refresh cycle did not run: {e}");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "started": true }))))
}

/// GET /api/v1/admin/assets/refresh/status — the polled progress record.
pub async fn handle_admin_refresh_status(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let progress = state.refresh.snapshot().await;
    Ok(Json(json!({
        "running": state.refresh.is_running(),
        "progress": progress,
    })))
}

/// POST /api/v1/admin/assets/discover — pull the Binance perpetual universe
/// and insert unknown symbols as discovered rows.
pub async fn handle_admin_discover_assets(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<DiscoverySummary>, AppError> {
    let summary = discover_assets(&state.db, &state.binance).await?;
    Ok(Json(summary))
}
