use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::errors::PipelineError;

/// Status and decoded body of one HTTP exchange.
///
/// Bodies that are not JSON are kept as a JSON string so error messages can
/// still quote them.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Short body excerpt for error messages.
    pub fn excerpt(&self) -> String {
        let text = match &self.body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.chars().take(200).collect()
    }
}

/// The HTTP seam every network client goes through.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        query: &[(String, String)],
    ) -> Result<HttpResponse, PipelineError>;

    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<HttpResponse, PipelineError>;
}

/// reqwest-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn decode(url: &str, response: reqwest::Response) -> Result<HttpResponse, PipelineError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| PipelineError::transport(url, e))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        debug!("🌐 {} -> HTTP {}", url, status);
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        query: &[(String, String)],
    ) -> Result<HttpResponse, PipelineError> {
        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::transport(url, e))?;
        Self::decode(url, response).await
    }

    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<HttpResponse, PipelineError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::transport(url, e))?;
        Self::decode(url, response).await
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One request as seen by the fake.
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub method: &'static str,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub query: Vec<(String, String)>,
        pub body: Option<Value>,
    }

    /// Replays queued responses in order and records every call.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, PipelineError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, response: Result<HttpResponse, PipelineError>) -> &Self {
            self.responses.lock().unwrap().push_back(response);
            self
        }

        pub fn push_ok(&self, body: Value) -> &Self {
            self.push(Ok(HttpResponse::ok(body)))
        }

        pub fn push_status(&self, status: u16, body: Value) -> &Self {
            self.push(Ok(HttpResponse { status, body }))
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        fn next(&self, call: RecordedCall) -> Result<HttpResponse, PipelineError> {
            let url = call.url.clone();
            self.calls.lock().unwrap().push(call);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PipelineError::transport(url, "no scripted response left")))
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get_json(
            &self,
            url: &str,
            headers: &[(String, String)],
            query: &[(String, String)],
        ) -> Result<HttpResponse, PipelineError> {
            self.next(RecordedCall {
                method: "GET",
                url: url.to_string(),
                headers: headers.to_vec(),
                query: query.to_vec(),
                body: None,
            })
        }

        async fn post_json(
            &self,
            url: &str,
            headers: &[(String, String)],
            body: &Value,
        ) -> Result<HttpResponse, PipelineError> {
            self.next(RecordedCall {
                method: "POST",
                url: url.to_string(),
                headers: headers.to_vec(),
                query: Vec::new(),
                body: Some(body.clone()),
            })
        }
    }
}
