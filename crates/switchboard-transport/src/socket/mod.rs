//! Socket Mode transport.
//!
//! One long-lived WebSocket connection carries enveloped deliveries. Every
//! inbound frame's envelope id is acknowledged with a frame sent back over
//! the same connection. No local retry state exists, because a dropped
//! connection causes platform-side redelivery. Reconnection (with backoff,
//! or on a `disconnect` control frame) is this transport's concern; the
//! dispatcher never sees it.

#[cfg(feature = "socket-mode")]
mod client;

#[cfg(feature = "socket-mode")]
pub use client::{ConnectionHandle, SocketModeClient};

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_core::event::{RETRY_NUM_HEADER, RETRY_REASON_HEADER};

use crate::error::{TransportError, TransportResult};

// =============================================================================
// Envelope
// =============================================================================

/// The vendor envelope wrapping every Socket Mode delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Delivery class: `events_api`, `interactive`, `slash_commands`.
    #[serde(rename = "type")]
    pub envelope_type: String,
    /// Unique id the ack frame must reference.
    pub envelope_id: String,
    /// The actual payload, shaped exactly like its webhook counterpart.
    #[serde(default)]
    pub payload: Value,
    /// Delivery retry count.
    #[serde(default)]
    pub retry_attempt: Option<u32>,
    /// Delivery retry reason.
    #[serde(default)]
    pub retry_reason: Option<String>,
    /// Whether the platform accepts a payload on the ack frame.
    #[serde(default)]
    pub accepts_response_payload: bool,
}

impl Envelope {
    /// Maps the envelope's retry metadata onto the canonical headers so
    /// dispatch sees the same shape as a webhook delivery.
    pub fn retry_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(attempt) = self.retry_attempt {
            headers.insert(RETRY_NUM_HEADER.to_string(), attempt.to_string());
        }
        if let Some(reason) = &self.retry_reason {
            headers.insert(RETRY_REASON_HEADER.to_string(), reason.clone());
        }
        headers
    }
}

/// Renders the acknowledgment frame for an envelope.
pub fn ack_frame(envelope_id: &str, payload: Option<&Value>) -> String {
    let frame = match payload {
        Some(payload) => serde_json::json!({
            "envelope_id": envelope_id,
            "payload": payload,
        }),
        None => serde_json::json!({ "envelope_id": envelope_id }),
    };
    frame.to_string()
}

/// Validates a connection URL handed back by `apps.connections.open`.
pub fn validate_wss_url(url: &str) -> TransportResult<()> {
    if !url.starts_with("wss://") {
        return Err(TransportError::ConnectionFailed {
            url: url.to_string(),
            reason: "connection URL must use the wss:// scheme".to_string(),
        });
    }
    let host = url
        .strip_prefix("wss://")
        .and_then(|rest| rest.split('/').next())
        .and_then(|host_port| host_port.split(':').next())
        .unwrap_or("");
    if host != "slack.com" && !host.ends_with(".slack.com") {
        return Err(TransportError::ConnectionFailed {
            url: url.to_string(),
            reason: format!("unexpected connection host {host}"),
        });
    }
    Ok(())
}

// =============================================================================
// Reconnect Policy
// =============================================================================

/// Exponential-backoff reconnection policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum reconnect attempts; `None` retries forever.
    pub max_retries: Option<u32>,
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// The delay to use after `current`, capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        std::cmp::min(
            Duration::from_secs_f64(current.as_secs_f64() * self.multiplier),
            self.max_delay,
        )
    }
}

/// Configuration for the Socket Mode transport.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// App-level token used to open connections.
    pub app_token: String,
    /// Whether to reconnect after a dropped connection.
    pub auto_reconnect: bool,
    /// Backoff policy for reconnection.
    pub retry: RetryConfig,
}

impl SocketConfig {
    /// Creates a config with default reconnection behavior.
    pub fn new(app_token: impl Into<String>) -> Self {
        Self {
            app_token: app_token.into(),
            auto_reconnect: true,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_parses_with_retry_metadata() {
        let raw = json!({
            "type": "events_api",
            "envelope_id": "abc-123",
            "payload": {"event": {"type": "app_mention"}},
            "retry_attempt": 2,
            "retry_reason": "timeout",
            "accepts_response_payload": false
        });
        let envelope: Envelope = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.envelope_type, "events_api");
        assert_eq!(envelope.envelope_id, "abc-123");

        let headers = envelope.retry_headers();
        assert_eq!(headers.get(RETRY_NUM_HEADER).map(String::as_str), Some("2"));
        assert_eq!(
            headers.get(RETRY_REASON_HEADER).map(String::as_str),
            Some("timeout")
        );
    }

    #[test]
    fn ack_frame_references_the_envelope() {
        let frame: Value = serde_json::from_str(&ack_frame("abc-123", None)).unwrap();
        assert_eq!(frame, json!({"envelope_id": "abc-123"}));

        let frame: Value =
            serde_json::from_str(&ack_frame("abc-123", Some(&json!({"text": "hi"})))).unwrap();
        assert_eq!(
            frame,
            json!({"envelope_id": "abc-123", "payload": {"text": "hi"}})
        );
    }

    #[test]
    fn wss_urls_are_validated() {
        assert!(validate_wss_url("wss://wss-primary.slack.com/link/?ticket=x").is_ok());
        assert!(validate_wss_url("ws://wss-primary.slack.com/link").is_err());
        assert!(validate_wss_url("wss://evil.example.com/link").is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig::default();
        let mut delay = retry.initial_delay;
        delay = retry.next_delay(delay);
        assert_eq!(delay, Duration::from_secs(2));
        for _ in 0..10 {
            delay = retry.next_delay(delay);
        }
        assert_eq!(delay, retry.max_delay);
    }
}
