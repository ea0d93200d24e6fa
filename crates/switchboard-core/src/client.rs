//! Outbound platform API access.
//!
//! The engine only needs enough of the remote API to acknowledge and
//! respond to events, so the surface is deliberately small: a generic
//! method call with the platform's `ok`/`error` envelope handling, a
//! `chat.postMessage` convenience, and raw URL posting for
//! `response_url` senders.
//!
//! The wire primitive is the [`ApiTransport`] trait; the reqwest-backed
//! implementation lives in the transport crate so this crate stays free of
//! HTTP machinery. The [`ClientCache`] is owned by the app instance that
//! created it (never a process-wide singleton) and is shared by
//! reference with the adapters.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, Result};

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://slack.com/api";

// =============================================================================
// Wire Primitive
// =============================================================================

/// The outbound wire primitive: POST a JSON body, return the parsed
/// response body.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Posts `body` to `url`, with `token` as bearer auth when present.
    async fn post_json(&self, url: &str, token: Option<&str>, body: Value) -> Result<Value>;
}

// =============================================================================
// Api Client
// =============================================================================

/// A token-bound client for platform Web API methods.
pub struct ApiClient {
    transport: Arc<dyn ApiTransport>,
    token: String,
    base_url: String,
}

impl ApiClient {
    /// Creates a client bound to one token.
    pub fn new(transport: Arc<dyn ApiTransport>, token: impl Into<String>) -> Self {
        Self::with_base_url(transport, token, DEFAULT_API_URL)
    }

    /// Creates a client against a non-default API base URL.
    pub fn with_base_url(
        transport: Arc<dyn ApiTransport>,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The token this client is bound to.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Calls a Web API method, unwrapping the `ok`/`error` envelope.
    pub async fn call(&self, method: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .transport
            .post_json(&url, Some(&self.token), body)
            .await?;

        if response.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(response)
        } else {
            let reason = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            Err(Error::api(method, reason))
        }
    }

    /// Posts a message to a channel.
    ///
    /// `message` may be a bare text string or a full message object
    /// (blocks, thread_ts, ...); the channel always wins over any
    /// `channel` field already present.
    pub async fn chat_post_message(&self, channel: &str, message: Value) -> Result<Value> {
        let mut body = match message {
            Value::String(text) => serde_json::json!({ "text": text }),
            Value::Object(_) => message,
            other => {
                return Err(Error::api(
                    "chat.postMessage",
                    format!("unsupported message shape: {other}"),
                ));
            }
        };
        body["channel"] = Value::String(channel.to_string());
        self.call("chat.postMessage", body).await
    }

    /// Posts a JSON body to an absolute URL (used for `response_url`
    /// senders, which do not speak the `ok` envelope).
    pub async fn post_url(&self, url: &str, body: Value) -> Result<()> {
        self.transport.post_json(url, None, body).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Client Cache
// =============================================================================

/// A lookup-or-create cache of [`ApiClient`]s keyed by token.
///
/// Read-mostly: lookups take the read lock; creation on miss re-checks
/// under the write lock so concurrent misses produce one client.
pub struct ClientCache {
    transport: Arc<dyn ApiTransport>,
    base_url: String,
    clients: RwLock<HashMap<String, Arc<ApiClient>>>,
}

impl ClientCache {
    /// Creates an empty cache over the given wire transport.
    pub fn new(transport: Arc<dyn ApiTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the client for `token`, creating it on first use.
    pub fn get_or_create(&self, token: &str) -> Arc<ApiClient> {
        if let Some(client) = self.clients.read().get(token) {
            return Arc::clone(client);
        }

        let mut clients = self.clients.write();
        // Re-check: another task may have created it between the locks.
        if let Some(client) = clients.get(token) {
            return Arc::clone(client);
        }
        let client = Arc::new(ApiClient::with_base_url(
            Arc::clone(&self.transport),
            token,
            self.base_url.clone(),
        ));
        clients.insert(token.to_string(), Arc::clone(&client));
        client
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTransport;

    #[async_trait]
    impl ApiTransport for EchoTransport {
        async fn post_json(
            &self,
            url: &str,
            _token: Option<&str>,
            body: Value,
        ) -> Result<Value> {
            if url.ends_with("/always.fails") {
                return Ok(json!({"ok": false, "error": "invalid_auth"}));
            }
            Ok(json!({"ok": true, "echo": body, "url": url}))
        }
    }

    fn cache() -> ClientCache {
        ClientCache::new(Arc::new(EchoTransport), DEFAULT_API_URL)
    }

    #[test]
    fn cache_reuses_clients_per_token() {
        let cache = cache();
        let a = cache.get_or_create("xoxb-1");
        let b = cache.get_or_create("xoxb-1");
        let c = cache.get_or_create("xoxb-2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn call_unwraps_error_envelope() {
        let client = cache().get_or_create("xoxb-1");
        let err = client.call("always.fails", json!({})).await.unwrap_err();
        match err {
            Error::Api { method, reason } => {
                assert_eq!(method, "always.fails");
                assert_eq!(reason, "invalid_auth");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn post_message_overrides_channel() {
        let client = cache().get_or_create("xoxb-1");
        let response = client
            .chat_post_message("C1", json!({"text": "hi", "channel": "C_IGNORED"}))
            .await
            .unwrap();
        assert_eq!(response["echo"]["channel"], json!("C1"));
    }

    #[tokio::test]
    async fn bare_string_becomes_text_message() {
        let client = cache().get_or_create("xoxb-1");
        let response = client
            .chat_post_message("C1", json!("plain"))
            .await
            .unwrap();
        assert_eq!(response["echo"]["text"], json!("plain"));
    }
}
