//! [`HttpClient`] backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::traits::{HttpClient, HttpRequest, HttpResponse};
use crate::ActionError;

/// Outbound HTTP over a shared connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, ActionError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ActionError::Fatal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ActionError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ActionError::Fatal(format!("invalid HTTP method '{}'", request.method)))?;

        let mut builder = self
            .inner
            .request(method, &request.url)
            .header("Idempotency-Key", &request.idempotency_key);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Some(Value::String(text)) => builder.body(text.clone()),
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ActionError::Retryable(format!("request to {} failed: {e}", request.url)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ActionError::Retryable(format!("reading response body failed: {e}")))?;
        debug!(url = %request.url, status, "http action response");

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(HttpResponse { status, body })
    }
}
