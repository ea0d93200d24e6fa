//! HTTP webhook transport.

#[cfg(feature = "api-client")]
pub mod client;
#[cfg(feature = "http-server")]
pub mod server;

use std::time::Duration;

/// Configuration for the HTTP webhook adapter.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Paths answering webhook deliveries. By default a single shared
    /// path receives events, interactive payloads, commands and options
    /// requests alike; classification sorts them out.
    pub paths: Vec<String>,
    /// Signing secret for request verification.
    pub signing_secret: String,
    /// When `false` (the default), a dispatch that returns without
    /// acknowledging is auto-acked with an empty body. When `true`, the
    /// adapter holds the response until the handler acks explicitly.
    pub deferred_ack: bool,
    /// How long to wait for an acknowledgment before answering 404
    /// regardless of whether dispatch eventually completes.
    pub unhandled_timeout: Duration,
}

impl HttpConfig {
    /// Creates a config with defaults for everything but the secret.
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            paths: vec!["/slack/events".to_string()],
            signing_secret: signing_secret.into(),
            deferred_ack: false,
            unhandled_timeout: Duration::from_millis(3001),
        }
    }

    /// The socket address to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
