//! Serverless proxy transport.
//!
//! One invocation carries one delivery: the function host hands us a
//! proxy event, we run dispatch to completion, and the return value is the
//! whole response. There is nothing to push to, so the ack merely records
//! that acknowledgment happened (and with what payload). A dispatch that
//! never acks yields 404, which causes platform-side redelivery exactly
//! like an unanswered webhook.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use switchboard_core::{AckHandle, App, Error, RawEvent};

use crate::body::parse_body;
use crate::signature::{SIGNATURE_HEADER, SignatureVerifier, TIMESTAMP_HEADER};

// =============================================================================
// Proxy Shapes
// =============================================================================

/// The vendor proxy event handed to the function.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEvent {
    /// HTTP method of the proxied request.
    #[serde(rename = "httpMethod", default)]
    pub http_method: String,
    /// Proxied request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Proxied request body, possibly base64-encoded.
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` is base64-encoded.
    #[serde(rename = "isBase64Encoded", default)]
    pub is_base64_encoded: bool,
}

/// The vendor proxy response returned from the function.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProxyResponse {
    /// HTTP status the proxy relays.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: String,
}

impl ProxyResponse {
    fn empty(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    fn json(status_code: u16, body: &Value) -> Self {
        Self {
            status_code,
            headers: HashMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body: body.to_string(),
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// The serverless adapter: call [`handle`](Self::handle) once per
/// invocation from the function entry point.
pub struct ServerlessHandler {
    app: Arc<App>,
    verifier: SignatureVerifier,
}

impl ServerlessHandler {
    /// Creates the adapter over a shared app.
    pub fn new(app: Arc<App>, signing_secret: impl Into<String>) -> Self {
        Self {
            app,
            verifier: SignatureVerifier::new(signing_secret),
        }
    }

    /// Processes one proxy invocation synchronously.
    pub async fn handle(&self, event: ProxyEvent) -> ProxyResponse {
        let headers: HashMap<String, String> = event
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();

        let raw_body = match decode_proxy_body(&event) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(error = %err, "Rejected proxy body");
                return ProxyResponse::empty(400);
            }
        };

        let content_type = headers.get("content-type").map(String::as_str);
        let payload = match parse_body(content_type, &raw_body) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(error = %err, "Rejected malformed body");
                return ProxyResponse::empty(400);
            }
        };

        // Control payloads bypass signature verification and dispatch.
        match payload.get("type").and_then(Value::as_str) {
            Some("url_verification") => {
                let challenge = payload
                    .get("challenge")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                return ProxyResponse::json(200, &serde_json::json!({ "challenge": challenge }));
            }
            Some("ssl_check") => return ProxyResponse::empty(200),
            _ => {}
        }

        let (Some(timestamp), Some(signature)) =
            (headers.get(TIMESTAMP_HEADER), headers.get(SIGNATURE_HEADER))
        else {
            return ProxyResponse::empty(401);
        };
        if let Err(err) = self.verifier.verify(timestamp, &raw_body, signature) {
            warn!(error = %err, "Rejected request signature");
            return ProxyResponse::empty(401);
        }

        let canonical = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to re-serialize payload");
                return ProxyResponse::empty(500);
            }
        };

        let (ack, recorded) = recording_ack();
        let raw = RawEvent::new(canonical, headers, ack);

        if let Err(err) = self.app.dispatch(raw).await {
            error!(error = %err, "Dispatch failed");
            return match err {
                Error::Authorization { .. } => ProxyResponse::empty(401),
                Error::EventProcessing(_) => ProxyResponse::empty(400),
                _ => ProxyResponse::empty(500),
            };
        }

        // Responses are synchronous return values, so the status derives
        // from whether anything acknowledged.
        match recorded.lock().take() {
            Some(Some(body)) => ProxyResponse::json(200, &body),
            Some(None) => ProxyResponse::empty(200),
            None => ProxyResponse::empty(404),
        }
    }
}

/// Decodes the proxy body, honoring the base64 flag.
fn decode_proxy_body(event: &ProxyEvent) -> Result<Vec<u8>, crate::error::TransportError> {
    let body = event.body.as_deref().unwrap_or("");
    if event.is_base64_encoded {
        BASE64
            .decode(body)
            .map_err(|e| crate::error::TransportError::payload(format!("invalid base64 body: {e}")))
    } else {
        Ok(body.as_bytes().to_vec())
    }
}

/// Builds an ack that records its invocation instead of writing anywhere.
///
/// The slot distinguishes "never acked" (`None`) from "acked bare"
/// (`Some(None)`) and "acked with payload" (`Some(Some(_))`).
type RecordedAck = Arc<Mutex<Option<Option<Value>>>>;

fn recording_ack() -> (AckHandle, RecordedAck) {
    let recorded: RecordedAck = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&recorded);
    let ack = AckHandle::new(Arc::new(move |payload| {
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            *slot.lock() = Some(payload);
            Ok(())
        })
    }));
    (ack, recorded)
}
