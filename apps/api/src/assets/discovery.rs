//! Seeds the asset table from the Binance USDT-perpetual universe. New
//! symbols arrive as `discovered` rows; admins flag them complete before
//! the refresh cycle will enrich them.

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use crate::clients::binance::BinanceClient;

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySummary {
    /// Tradable USDT perpetuals reported by Binance.
    pub universe: usize,
    /// Symbols inserted this run.
    pub discovered: usize,
}

pub async fn discover_assets(db: &PgPool, binance: &BinanceClient) -> Result<DiscoverySummary> {
    let universe = binance.exchange_info().await?;

    let known: Vec<(String,)> = sqlx::query_as("SELECT symbol FROM assets")
        .fetch_all(db)
        .await?;
    let known: HashSet<String> = known.into_iter().map(|(s,)| s).collect();

    let mut discovered = 0usize;
    for contract in &universe {
        if known.contains(&contract.symbol) {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO assets
                (id, symbol, base_symbol, status, admin_complete, created_at, updated_at)
            VALUES (gen_random_uuid(), $1, $2, 'discovered', FALSE, NOW(), NOW())
            ON CONFLICT (symbol) DO NOTHING
            "#,
        )
        .bind(&contract.symbol)
        .bind(&contract.base_asset)
        .execute(db)
        .await?;
        discovered += 1;
    }

    info!(
        "Asset discovery: {} in universe, {} new",
        universe.len(),
        discovered
    );
    Ok(DiscoverySummary {
        universe: universe.len(),
        discovered,
    })
}
