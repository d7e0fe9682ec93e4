/// Binance Futures client — used only to discover the tradable
/// USDT-perpetual universe that seeds the asset table.
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const BINANCE_FAPI_URL: &str = "https://fapi.binance.com";
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum BinanceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbol {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub contract_type: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeSymbol>,
}

/// Keeps only actively trading USDT-quoted perpetuals.
pub fn perpetual_universe(symbols: Vec<ExchangeSymbol>) -> Vec<ExchangeSymbol> {
    symbols
        .into_iter()
        .filter(|s| s.status == "TRADING" && s.contract_type == "PERPETUAL" && s.quote_asset == "USDT")
        .collect()
}

#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// GET /fapi/v1/exchangeInfo, filtered to the tradable perpetual universe.
    pub async fn exchange_info(&self) -> Result<Vec<ExchangeSymbol>, BinanceError> {
        let url = format!("{BINANCE_FAPI_URL}/fapi/v1/exchangeInfo");
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BinanceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ExchangeInfoResponse = response.json().await?;
        let universe = perpetual_universe(parsed.symbols);
        debug!("Binance exchange info: {} tradable USDT perpetuals", universe.len());
        Ok(universe)
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(sym: &str, base: &str, quote: &str, contract: &str, status: &str) -> ExchangeSymbol {
        ExchangeSymbol {
            symbol: sym.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            contract_type: contract.to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_universe_filters_non_perpetuals() {
        let all = vec![
            symbol("BTCUSDT", "BTC", "USDT", "PERPETUAL", "TRADING"),
            symbol("BTCUSDT_240628", "BTC", "USDT", "CURRENT_QUARTER", "TRADING"),
            symbol("ETHBTC", "ETH", "BTC", "PERPETUAL", "TRADING"),
            symbol("XRPUSDT", "XRP", "USDT", "PERPETUAL", "SETTLING"),
        ];
        let universe = perpetual_universe(all);
        assert_eq!(universe.len(), 1);
        assert_eq!(universe[0].symbol, "BTCUSDT");
    }

    #[test]
    fn test_exchange_symbol_deserializes_camel_case() {
        let raw = r#"{
            "symbol": "SOLUSDT",
            "baseAsset": "SOL",
            "quoteAsset": "USDT",
            "contractType": "PERPETUAL",
            "status": "TRADING"
        }"#;
        let parsed: ExchangeSymbol = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.base_asset, "SOL");
        assert_eq!(parsed.contract_type, "PERPETUAL");
    }
}
