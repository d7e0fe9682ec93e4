//! Asset metadata refresh engine.
//!
//! `refresh_single_asset` enriches one row from CoinGecko under the
//! verified-rows-are-never-overwritten policy. `run_refresh_cycle` walks
//! every asset due for a refresh with a fixed inter-call delay (CoinGecko's
//! public rate limit is unforgiving), guarded so only one cycle runs at a
//! time, and publishes progress to an in-process record that the admin
//! status endpoint polls. The progress record self-clears 30 seconds after
//! the cycle finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::clients::coingecko::{best_match, CoinGeckoClient, CoinGeckoError};
use crate::models::asset::Asset;

/// Assets refreshed longer ago than this are stale.
pub const STALE_AFTER_DAYS: i64 = 7;
const INTER_CALL_DELAY_SECS: u64 = 3;
const PROGRESS_CLEAR_DELAY_SECS: u64 = 30;

/// Why a single-asset refresh produced no update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefreshFailure {
    NoCoingeckoId,
    NoUpdateNeeded,
    RateLimit,
    NotFound,
    Timeout,
    NetworkError,
    UnknownError,
}

impl RefreshFailure {
    fn from_client(e: &CoinGeckoError) -> Self {
        match e {
            CoinGeckoError::RateLimited { .. } => RefreshFailure::RateLimit,
            CoinGeckoError::NotFound => RefreshFailure::NotFound,
            CoinGeckoError::Timeout => RefreshFailure::Timeout,
            CoinGeckoError::Http(_) => RefreshFailure::NetworkError,
            CoinGeckoError::Api { .. } => RefreshFailure::UnknownError,
        }
    }
}

/// Progress of the running (or just-finished) cycle, polled by the admin UI.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshProgress {
    pub reason: String,
    pub total: usize,
    pub current: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Single-flight guard plus the polled progress record.
pub struct RefreshTracker {
    running: AtomicBool,
    progress: RwLock<Option<RefreshProgress>>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            progress: RwLock::new(None),
        }
    }

    /// Claims the cycle slot. Returns false when a cycle is already running.
    fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Option<RefreshProgress> {
        self.progress.read().await.clone()
    }
}

impl Default for RefreshTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a refresh cycle is already running")]
    AlreadyRunning,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Whether the cycle should touch this asset: admin marked it complete, and
/// it is either stale or missing required metadata.
pub fn needs_refresh(asset: &Asset, now: DateTime<Utc>) -> bool {
    if !asset.admin_complete {
        return false;
    }
    let stale = match asset.last_refreshed_at {
        Some(at) => now - at > Duration::days(STALE_AFTER_DAYS),
        None => true,
    };
    stale || !asset.has_required_metadata()
}

/// Overwrite policy for one metadata field: verified rows only ever have
/// blanks filled; unverified rows take the upstream value when present.
pub fn merged_field(
    current: &Option<String>,
    upstream: Option<String>,
    verified: bool,
) -> Option<String> {
    let current_blank = current.as_deref().map(str::trim).unwrap_or("").is_empty();
    let upstream = upstream.filter(|v| !v.trim().is_empty());
    if verified && !current_blank {
        return current.clone();
    }
    upstream.or_else(|| current.clone())
}

/// Refreshes one asset from CoinGecko. `force` bypasses the freshness check
/// (admin-triggered refreshes) but never the verified-overwrite policy.
pub async fn refresh_single_asset(
    db: &PgPool,
    coingecko: &CoinGeckoClient,
    asset: &Asset,
    force: bool,
) -> Result<(), RefreshFailure> {
    let now = Utc::now();

    // 1. Resolve a CoinGecko id, reusing the stored one when present.
    let coingecko_id = match asset.coingecko_id.as_deref().filter(|s| !s.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            let hits = coingecko.search(&asset.base_symbol).await.map_err(|e| {
                warn!("CoinGecko search failed for {}: {e}", asset.symbol);
                RefreshFailure::from_client(&e)
            })?;
            let hit = best_match(&hits, &asset.base_symbol)
                .ok_or(RefreshFailure::NoCoingeckoId)?;
            info!(
                "Matched {} to CoinGecko '{}' ({})",
                asset.symbol, hit.id, hit.name
            );
            // Persist the id right away so a later failure doesn't lose it.
            sqlx::query("UPDATE assets SET coingecko_id = $1, updated_at = NOW() WHERE id = $2")
                .bind(&hit.id)
                .bind(asset.id)
                .execute(db)
                .await
                .map_err(|e| {
                    error!("Failed to persist coingecko_id for {}: {e}", asset.symbol);
                    RefreshFailure::UnknownError
                })?;
            hit.id.clone()
        }
    };

    // 2. Nothing to do for a fresh, complete row unless forced.
    if !force && !needs_refresh(asset, now) {
        return Err(RefreshFailure::NoUpdateNeeded);
    }

    // 3. Profile fetch; the client already absorbed the 429 backoff.
    let profile = coingecko.coin_profile(&coingecko_id).await.map_err(|e| {
        warn!("CoinGecko profile fetch failed for {}: {e}", asset.symbol);
        RefreshFailure::from_client(&e)
    })?;

    // 4. Logo download is best-effort; a broken image URL must not fail the
    // whole refresh.
    let logo_blank = asset
        .logo_data_url
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .is_empty();
    let mut logo = None;
    if force || logo_blank {
        if let Some(image_url) = profile.image.large.as_deref() {
            match coingecko.fetch_logo_data_url(image_url).await {
                Ok(data_url) => logo = Some(data_url),
                Err(e) => warn!("Logo download failed for {}: {e}", asset.symbol),
            }
        }
    }

    // 5. Apply the overwrite policy field by field.
    let verified = asset.is_verified();
    let name = merged_field(&asset.name, Some(profile.name.clone()), verified);
    let description = merged_field(
        &asset.description,
        profile.description.en.clone(),
        verified,
    );
    let logo_data_url = merged_field(&asset.logo_data_url, logo, verified);
    let website_url = merged_field(
        &asset.website_url,
        profile.website().map(str::to_string),
        verified,
    );
    let explorer_url = merged_field(
        &asset.explorer_url,
        profile.explorer().map(str::to_string),
        verified,
    );

    // Discovered rows that now carry full metadata graduate to complete;
    // verified rows keep their status.
    let refreshed = Asset {
        name: name.clone(),
        description: description.clone(),
        logo_data_url: logo_data_url.clone(),
        website_url: website_url.clone(),
        explorer_url: explorer_url.clone(),
        ..asset.clone()
    };
    let status = if !verified && refreshed.has_required_metadata() {
        "complete".to_string()
    } else {
        asset.status.clone()
    };

    sqlx::query(
        r#"
        UPDATE assets
        SET name = $1, description = $2, logo_data_url = $3, website_url = $4,
            explorer_url = $5, status = $6, last_refreshed_at = NOW(), updated_at = NOW()
        WHERE id = $7
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(&logo_data_url)
    .bind(&website_url)
    .bind(&explorer_url)
    .bind(&status)
    .bind(asset.id)
    .execute(db)
    .await
    .map_err(|e| {
        error!("Failed to persist refresh for {}: {e}", asset.symbol);
        RefreshFailure::UnknownError
    })?;

    info!("Refreshed asset {} from CoinGecko id {}", asset.symbol, coingecko_id);
    Ok(())
}

/// Runs one full refresh cycle. Returns `AlreadyRunning` when another cycle
/// holds the slot. Per-asset failures are counted, logged, and never abort
/// the batch.
pub async fn run_refresh_cycle(
    db: &PgPool,
    coingecko: &CoinGeckoClient,
    tracker: &Arc<RefreshTracker>,
    reason: &str,
) -> Result<CycleSummary, CycleError> {
    if !tracker.try_begin() {
        return Err(CycleError::AlreadyRunning);
    }

    let result = run_refresh_cycle_inner(db, coingecko, tracker, reason).await;
    tracker.end();

    // Self-clear the progress record a little after completion so a polling
    // admin page sees the final counts before they disappear.
    if result.is_ok() {
        let tracker = Arc::clone(tracker);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(PROGRESS_CLEAR_DELAY_SECS)).await;
            let mut progress = tracker.progress.write().await;
            let finished = progress.as_ref().is_some_and(|p| p.finished_at.is_some());
            if finished {
                *progress = None;
            }
        });
    }

    result
}

async fn run_refresh_cycle_inner(
    db: &PgPool,
    coingecko: &CoinGeckoClient,
    tracker: &RefreshTracker,
    reason: &str,
) -> Result<CycleSummary, CycleError> {
    let now = Utc::now();
    let all: Vec<Asset> =
        sqlx::query_as("SELECT * FROM assets WHERE admin_complete = TRUE ORDER BY last_refreshed_at ASC NULLS FIRST")
            .fetch_all(db)
            .await?;
    let candidates: Vec<Asset> = all.into_iter().filter(|a| needs_refresh(a, now)).collect();

    info!(
        "Starting asset refresh cycle ({reason}): {} candidates",
        candidates.len()
    );

    {
        let mut progress = tracker.progress.write().await;
        *progress = Some(RefreshProgress {
            reason: reason.to_string(),
            total: candidates.len(),
            current: 0,
            success: 0,
            failed: 0,
            skipped: 0,
            started_at: now,
            finished_at: None,
        });
    }

    let total = candidates.len();
    let mut summary = CycleSummary {
        total,
        success: 0,
        failed: 0,
        skipped: 0,
    };

    for (i, asset) in candidates.iter().enumerate() {
        let mut rate_limited = false;
        match refresh_single_asset(db, coingecko, asset, false).await {
            Ok(()) => summary.success += 1,
            Err(RefreshFailure::NoUpdateNeeded) => summary.skipped += 1,
            Err(failure) => {
                rate_limited = failure == RefreshFailure::RateLimit;
                warn!("Refresh failed for {}: {failure:?}", asset.symbol);
                summary.failed += 1;
            }
        }

        {
            let mut progress = tracker.progress.write().await;
            if let Some(p) = progress.as_mut() {
                p.current = i + 1;
                p.success = summary.success;
                p.failed = summary.failed;
                p.skipped = summary.skipped;
            }
        }

        if i + 1 < total {
            // Fixed pacing against CoinGecko's rate limit; doubled after a
            // 429 that survived the client's own backoff.
            let delay = if rate_limited {
                INTER_CALL_DELAY_SECS * 2
            } else {
                INTER_CALL_DELAY_SECS
            };
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        }
    }

    {
        let mut progress = tracker.progress.write().await;
        if let Some(p) = progress.as_mut() {
            p.finished_at = Some(Utc::now());
        }
    }

    info!(
        "Asset refresh cycle ({reason}) finished: {}/{} success, {} failed, {} skipped",
        summary.success, summary.total, summary.failed, summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn asset() -> Asset {
        Asset {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            base_symbol: "BTC".to_string(),
            name: Some("Bitcoin".to_string()),
            description: Some("desc".to_string()),
            logo_data_url: Some("data:image/png;base64,AAAA".to_string()),
            website_url: Some("https://bitcoin.org".to_string()),
            explorer_url: None,
            coingecko_id: Some("bitcoin".to_string()),
            status: "complete".to_string(),
            admin_complete: true,
            last_refreshed_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_fresh_complete_asset_not_refreshed() {
        assert!(!needs_refresh(&asset(), Utc::now()));
    }

    #[test]
    fn test_stale_asset_needs_refresh() {
        let mut a = asset();
        a.last_refreshed_at = Some(Utc::now() - Duration::days(STALE_AFTER_DAYS + 1));
        assert!(needs_refresh(&a, Utc::now()));
    }

    #[test]
    fn test_never_refreshed_asset_needs_refresh() {
        let mut a = asset();
        a.last_refreshed_at = None;
        assert!(needs_refresh(&a, Utc::now()));
    }

    #[test]
    fn test_missing_field_needs_refresh_even_when_fresh() {
        let mut a = asset();
        a.description = None;
        assert!(needs_refresh(&a, Utc::now()));
    }

    #[test]
    fn test_not_admin_complete_never_refreshed() {
        let mut a = asset();
        a.admin_complete = false;
        a.last_refreshed_at = None;
        assert!(!needs_refresh(&a, Utc::now()));
    }

    #[test]
    fn test_merged_field_unverified_takes_upstream() {
        let current = Some("old".to_string());
        let merged = merged_field(&current, Some("new".to_string()), false);
        assert_eq!(merged.as_deref(), Some("new"));
    }

    #[test]
    fn test_merged_field_verified_keeps_current() {
        let current = Some("curated".to_string());
        let merged = merged_field(&current, Some("upstream".to_string()), true);
        assert_eq!(merged.as_deref(), Some("curated"));
    }

    #[test]
    fn test_merged_field_verified_fills_blank() {
        let merged = merged_field(&None, Some("upstream".to_string()), true);
        assert_eq!(merged.as_deref(), Some("upstream"));
    }

    #[test]
    fn test_merged_field_blank_upstream_keeps_current() {
        let current = Some("kept".to_string());
        let merged = merged_field(&current, Some("   ".to_string()), false);
        assert_eq!(merged.as_deref(), Some("kept"));
    }

    #[test]
    fn test_tracker_single_flight() {
        let tracker = RefreshTracker::new();
        assert!(tracker.try_begin());
        assert!(!tracker.try_begin());
        tracker.end();
        assert!(tracker.try_begin());
    }
}
