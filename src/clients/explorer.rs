use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use super::http::HttpTransport;
use crate::errors::PipelineError;

/// Block explorer REST client (`{items, next_page_params}` cursor pages).
#[derive(Clone)]
pub struct ExplorerClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    page_delay: Duration,
}

#[derive(Debug, Clone, Deserialize)]
struct AddressRef {
    hash: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FeeRef {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExplorerItem {
    hash: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default, alias = "block")]
    block_number: Option<Value>,
    #[serde(default)]
    from: Option<AddressRef>,
    #[serde(default)]
    to: Option<AddressRef>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    fee: Option<FeeRef>,
}

/// One explorer transaction touching a registry pool.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExplorerTransaction {
    pub hash: String,
    pub pool: String,
    pub timestamp: Option<String>,
    pub block_number: Option<i64>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub value: Option<String>,
    pub status: Option<String>,
    pub method: Option<String>,
    pub fee: Option<String>,
}

impl ExplorerClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str, page_delay: Duration) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_delay,
        }
    }

    /// Follow `next_page_params` from `path` until it is null or a page is empty.
    pub async fn fetch_pages(&self, path: &str) -> Result<Vec<Value>, PipelineError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut items: Vec<Value> = Vec::new();
        let mut cursor: Vec<(String, String)> = Vec::new();

        loop {
            let response = self.transport.get_json(&url, &[], &cursor).await?;
            if !response.is_success() {
                return Err(PipelineError::transport(
                    &url,
                    format!("HTTP {}: {}", response.status, response.excerpt()),
                ));
            }

            let page = response
                .body
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if page.is_empty() {
                break;
            }
            items.extend(page);

            match response.body.get("next_page_params") {
                Some(Value::Object(params)) if !params.is_empty() => {
                    cursor = params
                        .iter()
                        .map(|(k, v)| {
                            let v = match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (k.clone(), v)
                        })
                        .collect();
                    debug!("📄 {} next page {:?}", url, cursor);
                }
                _ => break,
            }

            if !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }
        }

        Ok(items)
    }

    /// All transactions sent to or from a pool contract.
    pub async fn address_transactions(&self, pool: &str, address: &str) -> Result<Vec<ExplorerTransaction>, PipelineError> {
        let items = self.fetch_pages(&format!("addresses/{}/transactions", address)).await?;
        let table = format!("explorer transactions for {}", pool);
        let txs = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let item: ExplorerItem =
                    serde_json::from_value(item).map_err(|e| PipelineError::data_shape(&table, format!("item {}: {}", i, e)))?;
                Ok(ExplorerTransaction {
                    hash: item.hash,
                    pool: pool.to_string(),
                    timestamp: item.timestamp,
                    block_number: item.block_number.as_ref().and_then(|b| match b {
                        Value::Number(n) => n.as_i64(),
                        Value::String(s) => s.parse().ok(),
                        _ => None,
                    }),
                    from_address: item.from.map(|a| a.hash),
                    to_address: item.to.map(|a| a.hash),
                    value: item.value,
                    status: item.status,
                    method: item.method,
                    fee: item.fee.and_then(|f| f.value),
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        info!("🔎 Loaded {} explorer transactions for {}", txs.len(), pool);
        Ok(txs)
    }
}
