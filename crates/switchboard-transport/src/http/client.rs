//! Reqwest-backed outbound API transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;

use switchboard_core::{ApiTransport, Error, Result};

/// The production [`ApiTransport`]: one pooled reqwest client shared by
/// every cached API client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with a 30 second request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Creates a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Initialization(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, token: Option<&str>, body: Value) -> Result<Value> {
        let mut request = self.client.post(url).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::api(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(url, format!("HTTP {}: {}", status.as_u16(), text)));
        }

        // Response-URL endpoints answer plain "ok" rather than JSON.
        let text = response
            .text()
            .await
            .map_err(|e| Error::api(url, e.to_string()))?;
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(text)),
        }
    }
}
