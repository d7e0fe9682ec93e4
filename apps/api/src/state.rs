use std::sync::Arc;

use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::assets::refresh::RefreshTracker;
use crate::clients::binance::BinanceClient;
use crate::clients::coingecko::CoinGeckoClient;
use crate::clients::nowpayments::NowPaymentsClient;
use crate::config::Config;
use crate::email::Notifier;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Single-use nonce store for wallet sign-in challenges.
    pub redis: RedisClient,
    pub coingecko: CoinGeckoClient,
    pub binance: BinanceClient,
    pub nowpayments: NowPaymentsClient,
    pub notifier: Notifier,
    /// Single-flight guard + polled progress record for the refresh cycle.
    pub refresh: Arc<RefreshTracker>,
    pub config: Config,
}
