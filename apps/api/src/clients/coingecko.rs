/// CoinGecko client — the single point of entry for all CoinGecko calls.
///
/// ARCHITECTURAL RULE: No other module may call the CoinGecko API directly.
/// The refresh cycle depends on this module's error taxonomy to classify
/// per-asset failures, so transport errors and timeouts stay distinct.
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
const REQUEST_TIMEOUT_SECS: u64 = 15;
/// Backoff schedule applied on HTTP 429 before giving up.
const RATE_LIMIT_BACKOFF_SECS: [u64; 3] = [5, 10, 20];

#[derive(Debug, Error)]
pub enum CoinGeckoError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("rate limited after {retries} attempts")]
    RateLimited { retries: u32 },

    #[error("coin not found")]
    NotFound,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for CoinGeckoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CoinGeckoError::Timeout
        } else {
            CoinGeckoError::Http(e)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinSearchHit {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub market_cap_rank: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    coins: Vec<CoinSearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinProfile {
    pub name: String,
    pub description: ProfileDescription,
    pub links: ProfileLinks,
    pub image: ProfileImage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDescription {
    pub en: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileLinks {
    #[serde(default)]
    pub homepage: Vec<String>,
    #[serde(default)]
    pub blockchain_site: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileImage {
    pub large: Option<String>,
}

impl CoinProfile {
    /// First non-empty homepage link, if any.
    pub fn website(&self) -> Option<&str> {
        first_non_empty(&self.links.homepage)
    }

    pub fn explorer(&self) -> Option<&str> {
        first_non_empty(&self.links.blockchain_site)
    }
}

fn first_non_empty(urls: &[String]) -> Option<&str> {
    urls.iter().map(String::as_str).find(|u| !u.trim().is_empty())
}

/// Picks the CoinGecko id for a base symbol out of search results:
/// exact symbol matches only, best (lowest) market-cap rank wins,
/// unranked coins lose to any ranked one.
pub fn best_match<'a>(hits: &'a [CoinSearchHit], base_symbol: &str) -> Option<&'a CoinSearchHit> {
    hits.iter()
        .filter(|h| h.symbol.eq_ignore_ascii_case(base_symbol))
        .min_by_key(|h| h.market_cap_rank.unwrap_or(u32::MAX))
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// GET /search — coin hits ranked by CoinGecko's own relevance.
    pub async fn search(&self, query: &str) -> Result<Vec<CoinSearchHit>, CoinGeckoError> {
        let url = format!("{COINGECKO_API_URL}/search");
        let response = self.get_with_retry(&url, &[("query", query)]).await?;
        let parsed: SearchResponse = response.json().await?;
        debug!("CoinGecko search '{}' returned {} coins", query, parsed.coins.len());
        Ok(parsed.coins)
    }

    /// GET /coins/{id} — profile without tickers/market data.
    pub async fn coin_profile(&self, id: &str) -> Result<CoinProfile, CoinGeckoError> {
        let url = format!("{COINGECKO_API_URL}/coins/{id}");
        let response = self
            .get_with_retry(
                &url,
                &[
                    ("localization", "false"),
                    ("tickers", "false"),
                    ("market_data", "false"),
                    ("community_data", "false"),
                    ("developer_data", "false"),
                ],
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Downloads a logo and re-encodes it as an embeddable data URL.
    pub async fn fetch_logo_data_url(&self, url: &str) -> Result<String, CoinGeckoError> {
        let response = self.get_with_retry(url, &[]).await?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?;
        Ok(to_data_url(&mime, &bytes))
    }

    /// Shared GET with the 429 backoff policy: 5s, 10s, 20s, then give up.
    /// 404 and other non-success statuses are returned without retrying.
    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, CoinGeckoError> {
        let max_attempts = RATE_LIMIT_BACKOFF_SECS.len() as u32;

        for attempt in 0..=max_attempts {
            let mut request = self.client.get(url).query(query);
            if let Some(key) = &self.api_key {
                request = request.header("x-cg-demo-api-key", key);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.as_u16() == 429 {
                if attempt == max_attempts {
                    return Err(CoinGeckoError::RateLimited { retries: attempt });
                }
                let delay = RATE_LIMIT_BACKOFF_SECS[attempt as usize];
                warn!("CoinGecko rate limited on {url}, backing off {delay}s");
                tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                continue;
            }

            if status.as_u16() == 404 {
                return Err(CoinGeckoError::NotFound);
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(CoinGeckoError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(CoinGeckoError::RateLimited {
            retries: max_attempts,
        })
    }
}

fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, symbol: &str, rank: Option<u32>) -> CoinSearchHit {
        CoinSearchHit {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: id.to_string(),
            market_cap_rank: rank,
        }
    }

    #[test]
    fn test_best_match_prefers_lowest_rank() {
        let hits = vec![
            hit("wrapped-btc", "BTC", Some(14)),
            hit("bitcoin", "BTC", Some(1)),
            hit("bitcoin-cash", "BCH", Some(20)),
        ];
        assert_eq!(best_match(&hits, "btc").unwrap().id, "bitcoin");
    }

    #[test]
    fn test_best_match_ignores_other_symbols() {
        let hits = vec![hit("ethereum", "ETH", Some(2))];
        assert!(best_match(&hits, "BTC").is_none());
    }

    #[test]
    fn test_unranked_coin_loses_to_ranked() {
        let hits = vec![hit("some-fork", "BTC", None), hit("bitcoin", "BTC", Some(1))];
        assert_eq!(best_match(&hits, "BTC").unwrap().id, "bitcoin");
    }

    #[test]
    fn test_unranked_coin_still_matches_alone() {
        let hits = vec![hit("tiny-coin", "XYZ", None)];
        assert_eq!(best_match(&hits, "xyz").unwrap().id, "tiny-coin");
    }

    #[test]
    fn test_data_url_encoding() {
        let url = to_data_url("image/png", &[0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }
}
