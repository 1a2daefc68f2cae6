use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::http::HttpTransport;
use super::queries::SubgraphQuery;
use crate::errors::PipelineError;

/// Records per page; `skip` advances by this much.
pub const PAGE_SIZE: usize = 1000;

/// Pages a GraphQL subgraph with `skip` pagination until an empty page.
#[derive(Clone)]
pub struct SubgraphClient {
    transport: Arc<dyn HttpTransport>,
    page_delay: Duration,
}

impl SubgraphClient {
    pub fn new(transport: Arc<dyn HttpTransport>, page_delay: Duration) -> Self {
        Self { transport, page_delay }
    }

    /// Fetch every record of `query.entity` from `url`.
    ///
    /// Non-200 responses and GraphQL `errors` are transport errors; a missing
    /// entity key is a data-shape error.
    pub async fn fetch_all(&self, url: &str, query: &SubgraphQuery) -> Result<Vec<Value>, PipelineError> {
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        let mut records: Vec<Value> = Vec::new();
        let mut skip = 0usize;

        info!("🔍 Fetching {} from {}", query.entity, url);
        loop {
            debug!("📄 {} page skip={}", query.entity, skip);
            let body = json!({
                "query": query.document,
                "variables": { "skip": skip },
            });
            let response = self.transport.post_json(url, &headers, &body).await?;

            if response.status != 200 {
                return Err(PipelineError::transport(
                    url,
                    format!("HTTP {} fetching {}: {}", response.status, query.entity, response.excerpt()),
                ));
            }
            if let Some(errors) = response.body.get("errors").and_then(Value::as_array) {
                if !errors.is_empty() {
                    return Err(PipelineError::transport(
                        url,
                        format!("GraphQL errors fetching {}: {}", query.entity, Value::Array(errors.clone())),
                    ));
                }
            }

            let page = response
                .body
                .get("data")
                .and_then(|data| data.get(query.entity))
                .and_then(Value::as_array)
                .ok_or_else(|| PipelineError::data_shape(query.entity, "response has no record list"))?;

            if page.is_empty() {
                break;
            }
            if page.len() > PAGE_SIZE {
                warn!("⚠️ {} returned {} records for a {} page", query.entity, page.len(), PAGE_SIZE);
            }

            records.extend(page.iter().cloned());
            skip += PAGE_SIZE;

            if !self.page_delay.is_zero() {
                sleep(self.page_delay).await;
            }
        }

        info!("✅ Found {} {} records", records.len(), query.entity);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::http::fake::ScriptedTransport;
    use crate::clients::queries::{POOL_DEPOSITS, SWAPS};

    const URL: &str = "https://subgraph.test/pools";

    fn page(entity: &str, n: usize, offset: usize) -> Value {
        let rows: Vec<Value> = (0..n).map(|i| json!({ "id": offset + i })).collect();
        json!({ "data": { entity: rows } })
    }

    #[tokio::test]
    async fn test_full_pages_then_empty_page() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_ok(page("mints", PAGE_SIZE, 0))
            .push_ok(page("mints", PAGE_SIZE, PAGE_SIZE))
            .push_ok(page("mints", 0, 0))
            // never requested
            .push_ok(page("mints", PAGE_SIZE, 0));
        let client = SubgraphClient::new(transport.clone(), Duration::ZERO);

        let records = client.fetch_all(URL, &POOL_DEPOSITS).await.unwrap();

        assert_eq!(records.len(), 2 * PAGE_SIZE);
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        let skips: Vec<u64> = calls
            .iter()
            .map(|c| c.body.as_ref().unwrap()["variables"]["skip"].as_u64().unwrap())
            .collect();
        assert_eq!(skips, vec![0, 1000, 2000]);
    }

    #[tokio::test]
    async fn test_short_page_keeps_paging_until_empty() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(page("swaps", 10, 0)).push_ok(page("swaps", 0, 0));
        let client = SubgraphClient::new(transport.clone(), Duration::ZERO);

        let records = client.fetch_all(URL, &SWAPS).await.unwrap();

        assert_eq!(records.len(), 10);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_non_200_is_transport_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(502, json!("bad gateway"));
        let client = SubgraphClient::new(transport, Duration::ZERO);

        let err = client.fetch_all(URL, &POOL_DEPOSITS).await.unwrap_err();
        println!("error: {}", err);
        assert!(matches!(err, PipelineError::Transport { .. }));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_graphql_errors_are_raised() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({ "errors": [{ "message": "indexing error" }] }));
        let client = SubgraphClient::new(transport, Duration::ZERO);

        let err = client.fetch_all(URL, &POOL_DEPOSITS).await.unwrap_err();
        assert!(err.to_string().contains("indexing error"));
    }

    #[tokio::test]
    async fn test_missing_entity_is_data_shape_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({ "data": { "burns": [] } }));
        let client = SubgraphClient::new(transport, Duration::ZERO);

        let err = client.fetch_all(URL, &POOL_DEPOSITS).await.unwrap_err();
        assert!(matches!(err, PipelineError::DataShape { .. }));
    }
}
