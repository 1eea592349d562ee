//! HTTP client for the Momos service

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use momos_common::{ActionScript, ExecutionResult, GenerateRequest, GenerateResponse};

/// Client for communicating with the Momos service
pub struct ServiceClient {
    base_url: String,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<Value> {
        debug!("GET {}/health", self.base_url);
        let response = self.http.get(self.url("/health")).send().await?;
        decode(response).await
    }

    /// `POST /generate`
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        debug!("POST {}/generate for {}", self.base_url, request.url);
        let response = self
            .http
            .post(self.url("/generate"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    /// `POST /run`
    pub async fn run(&self, script: &ActionScript) -> Result<ExecutionResult> {
        debug!("POST {}/run with {} actions", self.base_url, script.actions.len());
        let response = self
            .http
            .post(self.url("/run"))
            .json(&json!({ "script": script }))
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    debug!("Service responded {}", status);
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    debug!("Service error body: {}", body.trim());
    Err(anyhow!("{} ({})", error_message(&body), status))
}

/// Message from a `{"error": ...}` body, or the raw body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"error":"Invalid script: version: bad"}"#), "Invalid script: version: bad");
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn test_base_url_normalized() {
        let client = ServiceClient::new("http://127.0.0.1:8787/");
        assert_eq!(client.url("/run"), "http://127.0.0.1:8787/run");
    }
}
