mod assets;
mod auth;
mod clients;
mod config;
mod db;
mod email;
mod errors;
mod jobs;
mod models;
mod payments;
mod routes;
mod sessions;
mod state;
mod suggestions;
mod watchlists;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assets::refresh::RefreshTracker;
use crate::clients::binance::BinanceClient;
use crate::clients::coingecko::CoinGeckoClient;
use crate::clients::nowpayments::NowPaymentsClient;
use crate::clients::sendgrid::SendGridClient;
use crate::config::Config;
use crate::db::create_pool;
use crate::email::Notifier;
use crate::jobs::spawn_background_jobs;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // tracing targets use the crate name with underscores
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting VolSpike API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis (nonce store)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Upstream clients
    let coingecko = CoinGeckoClient::new(config.coingecko_api_key.clone());
    let binance = BinanceClient::new();
    let nowpayments = NowPaymentsClient::new(config.nowpayments_api_key.clone());
    let sendgrid = SendGridClient::new(config.sendgrid_api_key.clone(), config.email_from.clone());
    let notifier = Notifier::new(Arc::new(sendgrid), config.app_base_url.clone());
    info!("Upstream clients initialized");

    // Build app state
    let state = AppState {
        db,
        redis,
        coingecko,
        binance,
        nowpayments,
        notifier,
        refresh: Arc::new(RefreshTracker::new()),
        config: config.clone(),
    };

    // Background jobs (payment sync, refresh cycle, discovery, reminders)
    spawn_background_jobs(state.clone());

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
