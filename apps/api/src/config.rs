use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub nowpayments_api_key: String,
    pub nowpayments_ipn_secret: String,
    pub sendgrid_api_key: String,
    /// Optional: the demo tier of the CoinGecko API works unauthenticated.
    pub coingecko_api_key: Option<String>,
    pub email_from: String,
    pub app_base_url: String,
    /// Domain expected in SIWE/SIWS sign-in messages.
    pub siwe_domain: String,
    pub port: u16,
    pub rust_log: String,
    /// Allows running a pure-API instance next to a dedicated worker instance.
    pub enable_background_jobs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            jwt_secret: require_env("JWT_SECRET")?,
            nowpayments_api_key: require_env("NOWPAYMENTS_API_KEY")?,
            nowpayments_ipn_secret: require_env("NOWPAYMENTS_IPN_SECRET")?,
            sendgrid_api_key: require_env("SENDGRID_API_KEY")?,
            coingecko_api_key: std::env::var("COINGECKO_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "alerts@volspike.com".to_string()),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "https://volspike.com".to_string()),
            siwe_domain: std::env::var("SIWE_DOMAIN")
                .unwrap_or_else(|_| "volspike.com".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            enable_background_jobs: std::env::var("ENABLE_BACKGROUND_JOBS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
