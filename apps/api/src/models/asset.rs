use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a tracked symbol: discovered from the Binance universe,
/// completed by an admin, optionally verified (hand-curated metadata that
/// refreshes must not overwrite).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Discovered,
    Complete,
    Verified,
}

impl AssetStatus {
    pub fn parse(s: &str) -> Option<AssetStatus> {
        match s {
            "discovered" => Some(AssetStatus::Discovered),
            "complete" => Some(AssetStatus::Complete),
            "verified" => Some(AssetStatus::Verified),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Discovered => "discovered",
            AssetStatus::Complete => "complete",
            AssetStatus::Verified => "verified",
        }
    }
}

/// A tracked crypto symbol with cached CoinGecko metadata.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: Uuid,
    /// Full contract symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Base asset, e.g. `BTC` — what we search CoinGecko for.
    pub base_symbol: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_data_url: Option<String>,
    pub website_url: Option<String>,
    pub explorer_url: Option<String>,
    pub coingecko_id: Option<String>,
    pub status: String,
    /// Set by an admin once the row is ready for the refresh cycle.
    pub admin_complete: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn status(&self) -> AssetStatus {
        AssetStatus::parse(&self.status).unwrap_or(AssetStatus::Discovered)
    }

    pub fn is_verified(&self) -> bool {
        self.status() == AssetStatus::Verified
    }

    /// Fields that must be populated before an asset counts as complete.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.name) {
            missing.push("name");
        }
        if is_blank(&self.description) {
            missing.push("description");
        }
        if is_blank(&self.logo_data_url) {
            missing.push("logo");
        }
        if is_blank(&self.website_url) {
            missing.push("website_url");
        }
        missing
    }

    pub fn has_required_metadata(&self) -> bool {
        self.missing_required_fields().is_empty()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> Asset {
        Asset {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            base_symbol: "BTC".to_string(),
            name: Some("Bitcoin".to_string()),
            description: Some("The original cryptocurrency".to_string()),
            logo_data_url: Some("data:image/png;base64,AAAA".to_string()),
            website_url: Some("https://bitcoin.org".to_string()),
            explorer_url: None,
            coingecko_id: Some("bitcoin".to_string()),
            status: "complete".to_string(),
            admin_complete: true,
            last_refreshed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_complete_asset_has_no_missing_fields() {
        assert!(asset().has_required_metadata());
    }

    #[test]
    fn test_blank_description_counts_as_missing() {
        let mut a = asset();
        a.description = Some("   ".to_string());
        assert_eq!(a.missing_required_fields(), vec!["description"]);
    }

    #[test]
    fn test_explorer_url_is_not_required() {
        let mut a = asset();
        a.explorer_url = None;
        assert!(a.has_required_metadata());
    }
}
