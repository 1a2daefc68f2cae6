use std::sync::Arc;
use tracing::info;

use super::http::HttpTransport;
use super::retry::RetryPolicy;
use crate::errors::PipelineError;
use crate::processors::events::normalizer::PriceTable;

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko `simple/price` client. One fetch per run.
#[derive(Clone)]
pub struct PriceFeedClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl PriceFeedClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str, api_key: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        }
    }

    /// USD prices for every known feed id, retried on transport failures.
    pub async fn fetch_prices(&self) -> Result<PriceTable, PipelineError> {
        let url = format!("{}/simple/price", self.base_url);
        let query = vec![
            ("ids".to_string(), PriceTable::feed_ids()),
            ("vs_currencies".to_string(), "usd".to_string()),
        ];
        let headers: Vec<(String, String)> = self
            .api_key
            .iter()
            .map(|key| (API_KEY_HEADER.to_string(), key.clone()))
            .collect();

        let transport = &self.transport;
        let (url, headers, query) = (&url, &headers, &query);
        let body = self
            .retry
            .run("price feed", move || async move {
                let response = transport.get_json(url, headers, query).await?;
                if !response.is_success() {
                    return Err(PipelineError::transport(
                        url,
                        format!("HTTP {}: {}", response.status, response.excerpt()),
                    ));
                }
                Ok(response.body)
            })
            .await?;

        let prices = PriceTable::from_feed_response(&body)?;
        info!("💰 Loaded USD prices for {} feeds", prices.len());
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::http::fake::ScriptedTransport;
    use serde_json::json;
    use std::time::Duration;

    fn client(transport: Arc<ScriptedTransport>, key: Option<&str>) -> PriceFeedClient {
        PriceFeedClient::new(
            transport,
            "https://prices.test/api/v3",
            key.map(str::to_string),
            RetryPolicy::new(3, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_fetch_prices_sends_ids_and_key() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({ "bitcoin": { "usd": 100000.0 }, "usd-coin": { "usd": 1.0 } }));

        let prices = client(transport.clone(), Some("demo-key")).fetch_prices().await.unwrap();

        assert_eq!(prices.usd_rate("BTC").unwrap(), 100000.0);
        assert_eq!(prices.usd_rate("MUSD").unwrap(), 1.0);
        let calls = transport.calls();
        assert_eq!(calls[0].url, "https://prices.test/api/v3/simple/price");
        assert!(calls[0].headers.contains(&(API_KEY_HEADER.to_string(), "demo-key".to_string())));
        assert!(calls[0].query.iter().any(|(k, v)| k == "ids" && v.contains("bitcoin")));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_status(429, json!("rate limited"))
            .push(Err(PipelineError::transport("https://prices.test", "timeout")))
            .push_ok(json!({ "bitcoin": { "usd": 90000.0 } }));

        let prices = client(transport.clone(), None).fetch_prices().await.unwrap();

        assert_eq!(prices.usd_rate("BTC").unwrap(), 90000.0);
        assert_eq!(transport.calls().len(), 3);
        assert!(transport.calls()[0].headers.is_empty());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_aborts() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..4 {
            transport.push_status(503, json!("unavailable"));
        }

        let err = client(transport.clone(), None).fetch_prices().await.unwrap_err();

        assert!(matches!(err, PipelineError::Transport { .. }));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_response_fails_loudly() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({}));

        let err = client(transport.clone(), None).fetch_prices().await.unwrap_err();

        assert!(matches!(err, PipelineError::DataShape { .. }));
        assert_eq!(transport.calls().len(), 1);
    }
}
