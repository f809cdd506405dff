//! Upstream market-data client for the Dexscreener token endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::WatchError;

/// Snapshot of a token's market data at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub market_cap: f64,
    /// 24h percentage change. The upstream may omit it; absence is not an error.
    pub price_change_24h: Option<f64>,
}

/// Anything that can resolve a token address to a current quote.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn fetch(&self, token_address: &str) -> Result<Quote, WatchError>;
}

/// HTTP client for the market-data endpoint.
///
/// Owns the retry/backoff policy; caching is composed on top by
/// [`PriceCache`](crate::modules::price_cache::PriceCache).
pub struct PriceSource {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
}

impl PriceSource {
    pub fn new(config: &Config) -> Result<Self, WatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            max_attempts: config.fetch_max_attempts.max(1),
        })
    }
}

#[async_trait]
impl QuoteFetcher for PriceSource {
    async fn fetch(&self, token_address: &str) -> Result<Quote, WatchError> {
        let url = format!("{}/{}", self.base_url, token_address);
        let mut delay = Duration::from_millis(500);
        let mut attempt = 1u32;

        loop {
            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    // Timeouts and unreachable hosts both bound the caller's
                    // wait and are routed to the admin diagnostic channel.
                    warn!(target: "PRICE_SOURCE", "request failed for {}: {}", token_address, e);
                    return Err(WatchError::Timeout);
                }
            };

            let status = response.status().as_u16();
            if (200..300).contains(&status) {
                let body: Value = response.json().await.map_err(|_| WatchError::BadData)?;
                let quote = parse_quote(&body)?;
                debug!(
                    target: "PRICE_SOURCE",
                    "quote for {}: price={} mcap={}",
                    token_address, quote.price, quote.market_cap
                );
                return Ok(quote);
            }

            if should_retry(status) && attempt < self.max_attempts {
                warn!(
                    target: "PRICE_SOURCE",
                    "upstream {} for {}, retrying in {}ms (attempt {}/{})",
                    status, token_address, delay.as_millis(), attempt, self.max_attempts
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
                continue;
            }

            return Err(WatchError::UpstreamApi(status));
        }
    }
}

/// Retry is reserved for rate limiting and server-side failures.
pub(crate) fn should_retry(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Extract the first listed trading pair from a Dexscreener token payload.
///
/// A body without a usable price listing (non-object, empty or missing
/// `pairs`) is `NotFound`; a listing with malformed numeric fields is
/// `BadData`.
pub(crate) fn parse_quote(body: &Value) -> Result<Quote, WatchError> {
    let Some(object) = body.as_object() else {
        return Err(WatchError::NotFound);
    };

    let first = match object.get("pairs").and_then(Value::as_array) {
        Some(pairs) if !pairs.is_empty() => &pairs[0],
        _ => return Err(WatchError::NotFound),
    };

    // priceUsd arrives as a string on most pairs, a bare number on some.
    let price = match first.get("priceUsd") {
        Some(Value::String(s)) => s.parse::<f64>().map_err(|_| WatchError::BadData)?,
        Some(Value::Number(n)) => n.as_f64().ok_or(WatchError::BadData)?,
        _ => return Err(WatchError::BadData),
    };
    if !price.is_finite() || price <= 0.0 {
        return Err(WatchError::BadData);
    }

    let market_cap = first
        .get("fdv")
        .and_then(Value::as_f64)
        .ok_or(WatchError::BadData)?;
    if !market_cap.is_finite() || market_cap < 0.0 {
        return Err(WatchError::BadData);
    }

    let price_change_24h = first
        .get("priceChange")
        .and_then(|change| change.get("h24"))
        .and_then(Value::as_f64);

    Ok(Quote {
        price,
        market_cap,
        price_change_24h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testkit::test_config;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// HTTP stub on a local port: answers request n with statuses[n],
    /// repeating the last status once the script runs out, and counts hits.
    async fn upstream_stub(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses[n.min(statuses.len() - 1)];
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request).await;

                let body = if status == 200 {
                    r#"{"pairs":[{"priceUsd":"1.5","fdv":1000.0}]}"#
                } else {
                    ""
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    if status == 200 { "OK" } else { "Error" },
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        (base_url, hits)
    }

    fn source(base_url: &str, max_attempts: u32) -> PriceSource {
        let config = Config {
            api_base_url: base_url.to_string(),
            fetch_max_attempts: max_attempts,
            ..test_config()
        };
        PriceSource::new(&config).unwrap()
    }

    #[tokio::test]
    async fn persistent_500_exhausts_the_attempt_budget_then_surfaces_once() {
        let (base_url, hits) = upstream_stub(vec![500]).await;
        let source = source(&base_url, 3);

        let err = source.fetch("T1").await.unwrap_err();
        assert!(matches!(err, WatchError::UpstreamApi(500)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (base_url, hits) = upstream_stub(vec![404]).await;
        let source = source(&base_url, 3);

        let err = source.fetch("T1").await.unwrap_err();
        assert!(matches!(err, WatchError::UpstreamApi(404)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_recovers_when_the_upstream_comes_back() {
        let (base_url, hits) = upstream_stub(vec![503, 200]).await;
        let source = source(&base_url, 3);

        let quote = source.fetch("T1").await.unwrap();
        assert_eq!(quote.price, 1.5);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    fn payload(price_usd: Value, fdv: Value, h24: Option<f64>) -> Value {
        let mut pair = json!({ "priceUsd": price_usd, "fdv": fdv });
        if let Some(h24) = h24 {
            pair["priceChange"] = json!({ "h24": h24 });
        }
        json!({ "pairs": [pair] })
    }

    #[test]
    fn parses_full_payload() {
        let body = payload(json!("1.2345"), json!(987654.32), Some(-4.2));
        let quote = parse_quote(&body).unwrap();
        assert_eq!(quote.price, 1.2345);
        assert_eq!(quote.market_cap, 987654.32);
        assert_eq!(quote.price_change_24h, Some(-4.2));
    }

    #[test]
    fn accepts_numeric_price_usd() {
        let body = payload(json!(0.5), json!(1000.0), None);
        let quote = parse_quote(&body).unwrap();
        assert_eq!(quote.price, 0.5);
    }

    #[test]
    fn absent_h24_is_unknown_not_error() {
        let body = payload(json!("2.0"), json!(0.0), None);
        let quote = parse_quote(&body).unwrap();
        assert_eq!(quote.price_change_24h, None);
    }

    #[test]
    fn empty_pairs_is_not_found() {
        let body = json!({ "pairs": [] });
        assert!(matches!(parse_quote(&body), Err(WatchError::NotFound)));
    }

    #[test]
    fn missing_pairs_is_not_found() {
        let body = json!({ "schemaVersion": "1.0.0" });
        assert!(matches!(parse_quote(&body), Err(WatchError::NotFound)));
    }

    #[test]
    fn non_object_body_is_not_found() {
        let body = json!(["unexpected"]);
        assert!(matches!(parse_quote(&body), Err(WatchError::NotFound)));
    }

    #[test]
    fn malformed_price_is_bad_data() {
        let body = payload(json!("not-a-number"), json!(1000.0), None);
        assert!(matches!(parse_quote(&body), Err(WatchError::BadData)));
    }

    #[test]
    fn non_positive_price_is_bad_data() {
        let body = payload(json!("0"), json!(1000.0), None);
        assert!(matches!(parse_quote(&body), Err(WatchError::BadData)));
    }

    #[test]
    fn missing_fdv_is_bad_data() {
        let body = json!({ "pairs": [{ "priceUsd": "1.0" }] });
        assert!(matches!(parse_quote(&body), Err(WatchError::BadData)));
    }

    #[test]
    fn retry_only_on_rate_limit_and_server_errors() {
        assert!(should_retry(429));
        assert!(should_retry(500));
        assert!(should_retry(503));
        assert!(!should_retry(400));
        assert!(!should_retry(404));
        assert!(!should_retry(418));
    }
}
