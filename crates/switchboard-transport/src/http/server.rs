//! HTTP webhook adapter.
//!
//! One axum server, one task per request. Each request is decoded,
//! verified, and dispatched; the response is driven entirely by the ack
//! contract:
//!
//! - the handler acks → that payload becomes the response body;
//! - dispatch returns un-acked (default mode) → auto-ack, empty 200;
//! - nothing acks within the unhandled-request deadline → 404, while the
//!   dispatch task keeps running to completion on its own;
//! - dispatch fails before any ack → the error is translated to a status
//!   (401 auth, 400 malformed, 500 otherwise).
//!
//! `url_verification` and `ssl_check` control payloads are answered
//! directly, before signature verification and without dispatch.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use switchboard_core::{AckHandle, App, Error, RawEvent};

use crate::body::parse_body;
use crate::error::{TransportError, TransportResult};
use crate::http::HttpConfig;
use crate::signature::{SIGNATURE_HEADER, SignatureVerifier, TIMESTAMP_HEADER};

/// The HTTP webhook adapter.
pub struct HttpServer {
    state: Arc<ServerState>,
    config: HttpConfig,
}

/// Shared per-server state.
struct ServerState {
    app: Arc<App>,
    verifier: SignatureVerifier,
    deferred_ack: bool,
    unhandled_timeout: std::time::Duration,
    /// Tracks dispatch tasks so shutdown can wait for in-flight work.
    dispatches: TaskTracker,
}

/// A running listener; dropping the handle does not stop the server, call
/// [`ListenerHandle::shutdown`].
pub struct ListenerHandle {
    name: String,
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    join: tokio::task::JoinHandle<()>,
    dispatches: TaskTracker,
}

impl ListenerHandle {
    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting requests, waits for in-flight requests and their
    /// dispatch tasks to finish, and releases the port.
    pub async fn shutdown(self) {
        info!(name = %self.name, "HTTP server shutting down");
        let _ = self.shutdown_tx.send(());
        let _ = self.join.await;
        self.dispatches.close();
        self.dispatches.wait().await;
    }
}

impl HttpServer {
    /// Creates the adapter over a shared app.
    pub fn new(app: Arc<App>, config: HttpConfig) -> Self {
        let state = Arc::new(ServerState {
            app,
            verifier: SignatureVerifier::new(config.signing_secret.clone()),
            deferred_ack: config.deferred_ack,
            unhandled_timeout: config.unhandled_timeout,
            dispatches: TaskTracker::new(),
        });
        Self { state, config }
    }

    /// Binds the configured address and starts serving.
    pub async fn start(&self) -> TransportResult<ListenerHandle> {
        let mut router = Router::new();
        for path in &self.config.paths {
            let path = if path.starts_with('/') {
                path.clone()
            } else {
                format!("/{path}")
            };
            router = router.route(&path, post(handle_request));
        }
        let router = router.with_state(Arc::clone(&self.state));

        let addr = self.config.bind_addr();
        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| TransportError::Bind {
                    addr: addr.clone(),
                    reason: e.to_string(),
                })?;
        let actual_addr = listener.local_addr()?;

        info!(addr = %actual_addr, paths = ?self.config.paths, "HTTP server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "HTTP server error");
            }
        });

        Ok(ListenerHandle {
            name: format!("http-server-{actual_addr}"),
            addr: actual_addr,
            shutdown_tx,
            join,
            dispatches: self.state.dispatches.clone(),
        })
    }
}

/// Handles one webhook delivery.
async fn handle_request(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_map = lowercase_headers(&headers);
    let content_type = header_map.get(header::CONTENT_TYPE.as_str()).map(String::as_str);

    let payload = match parse_body(content_type, &body) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "Rejected malformed body");
            return (StatusCode::BAD_REQUEST, "invalid request body").into_response();
        }
    };

    // Control payloads bypass both signature verification and dispatch.
    match payload.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = payload
                .get("challenge")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Json(serde_json::json!({ "challenge": challenge })).into_response();
        }
        Some("ssl_check") => return StatusCode::OK.into_response(),
        _ => {}
    }

    let (Some(timestamp), Some(signature)) = (
        header_map.get(TIMESTAMP_HEADER),
        header_map.get(SIGNATURE_HEADER),
    ) else {
        debug!("Missing signature headers");
        return (StatusCode::UNAUTHORIZED, "missing signature").into_response();
    };
    if let Err(err) = state.verifier.verify(timestamp, &body, signature) {
        warn!(error = %err, "Rejected request signature");
        return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
    }

    // The canonical body: form encodings have been decoded to JSON.
    let canonical = match serde_json::to_vec(&payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to re-serialize payload");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let (ack, mut ack_rx) = response_ack();
    let (err_tx, mut err_rx) = oneshot::channel::<Error>();
    let raw = RawEvent::new(canonical, header_map, ack.clone());

    // Dispatch runs on its own task so an unhandled-request response never
    // cancels handler work.
    let app = Arc::clone(&state.app);
    let deferred = state.deferred_ack;
    state.dispatches.spawn(async move {
        match app.dispatch(raw).await {
            Ok(()) => {
                if !deferred && !ack.is_acked() {
                    // Auto-ack; losing a race against a late handler ack
                    // is fine, the flag settles it.
                    let _ = ack.ack(None).await;
                }
            }
            Err(err) => {
                error!(error = %err, "Dispatch failed");
                let _ = err_tx.send(err);
            }
        }
    });

    let deadline = tokio::time::sleep(state.unhandled_timeout);
    tokio::pin!(deadline);
    let mut dispatch_pending = true;

    loop {
        tokio::select! {
            payload = &mut ack_rx => {
                return match payload {
                    Ok(payload) => render_ack(payload),
                    // The ack sender can only vanish if the dispatch task
                    // dropped every handle without acking; treat like an
                    // unhandled request.
                    Err(_) => (StatusCode::NOT_FOUND, "unhandled request").into_response(),
                };
            }
            err = &mut err_rx, if dispatch_pending => {
                match err {
                    Ok(err) => return render_error(&err),
                    // Dispatch finished cleanly; keep waiting for the ack
                    // (deferred mode) or the deadline.
                    Err(_) => dispatch_pending = false,
                }
            }
            _ = &mut deadline => {
                warn!("No acknowledgment before deadline, answering 404");
                return (StatusCode::NOT_FOUND, "unhandled request").into_response();
            }
        }
    }
}

/// Builds an ack handle whose effect resolves the pending HTTP response.
fn response_ack() -> (AckHandle, oneshot::Receiver<Option<Value>>) {
    let (tx, rx) = oneshot::channel::<Option<Value>>();
    let slot = Arc::new(Mutex::new(Some(tx)));
    let ack = AckHandle::new(Arc::new(move |payload| {
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            if let Some(tx) = slot.lock().await.take() {
                let _ = tx.send(payload);
            }
            Ok(())
        })
    }));
    (ack, rx)
}

fn render_ack(payload: Option<Value>) -> Response {
    match payload {
        Some(body) => Json(body).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

/// Translates a dispatch error into a transport status. The engine owns
/// the taxonomy; the adapter owns this mapping.
fn render_error(err: &Error) -> Response {
    let status = match err {
        Error::Authorization { .. } => StatusCode::UNAUTHORIZED,
        Error::EventProcessing(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, "dispatch failed").into_response()
}

fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use switchboard_core::{ApiTransport, Result as CoreResult, listener_fn};

    const SECRET: &str = "test-signing-secret";

    struct NullTransport;

    #[async_trait]
    impl ApiTransport for NullTransport {
        async fn post_json(
            &self,
            _url: &str,
            _token: Option<&str>,
            _body: Value,
        ) -> CoreResult<Value> {
            Ok(json!({"ok": true}))
        }
    }

    fn state_with(app: App, deferred: bool, timeout_ms: u64) -> Arc<ServerState> {
        Arc::new(ServerState {
            app: Arc::new(app),
            verifier: SignatureVerifier::new(SECRET),
            deferred_ack: deferred,
            unhandled_timeout: Duration::from_millis(timeout_ms),
            dispatches: TaskTracker::new(),
        })
    }

    fn plain_app() -> App {
        App::builder()
            .token("xoxb-test")
            .api_transport(Arc::new(NullTransport))
            .build()
            .unwrap()
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string();
        let signature = SignatureVerifier::new(SECRET).compute(&now, body);
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, now.parse().unwrap());
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn url_verification_answers_without_signature() {
        let state = state_with(plain_app(), false, 3001);
        let body = br#"{"type":"url_verification","challenge":"abc123"}"#;
        let response = handle_request(State(state), HeaderMap::new(), Bytes::from_static(body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"challenge": "abc123"})
        );
    }

    #[tokio::test]
    async fn ssl_check_answers_empty_ok() {
        let state = state_with(plain_app(), false, 3001);
        let body = br#"{"type":"ssl_check","token":"t"}"#;
        let response = handle_request(State(state), HeaderMap::new(), Bytes::from_static(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized() {
        let state = state_with(plain_app(), false, 3001);
        let body = br#"{"event":{"type":"app_mention"}}"#;
        let response = handle_request(State(state), HeaderMap::new(), Bytes::from_static(body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stale_timestamp_is_unauthorized() {
        let state = state_with(plain_app(), false, 3001);
        let body: &[u8] = br#"{"event":{"type":"app_mention"}}"#;

        let stale = (SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            - 400)
            .to_string();
        let signature = SignatureVerifier::new(SECRET).compute(&stale, body);
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, stale.parse().unwrap());
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());

        let response = handle_request(State(state), headers, Bytes::from(body.to_vec())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unacked_dispatch_auto_acks_empty_ok() {
        let app = App::builder()
            .token("xoxb-test")
            .api_transport(Arc::new(NullTransport))
            .event("app_mention", listener_fn(|_args| async { Ok(()) }))
            .build()
            .unwrap();
        let state = state_with(app, false, 3001);

        let body = br#"{"event":{"type":"app_mention"}}"#.to_vec();
        let headers = signed_headers(&body);
        let response = handle_request(State(state), headers, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handler_ack_payload_becomes_the_response() {
        let app = App::builder()
            .token("xoxb-test")
            .api_transport(Arc::new(NullTransport))
            .command(
                "/deploy",
                listener_fn(|args| async move {
                    args.command().unwrap().ack_with(json!("rolling out")).await
                }),
            )
            .build()
            .unwrap();
        let state = state_with(app, false, 3001);

        let body = br#"{"command":"/deploy","text":"prod"}"#.to_vec();
        let headers = signed_headers(&body);
        let response = handle_request(State(state), headers, Bytes::from(body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"text": "rolling out"})
        );
    }

    #[tokio::test]
    async fn deferred_mode_times_out_to_not_found() {
        let app = App::builder()
            .token("xoxb-test")
            .api_transport(Arc::new(NullTransport))
            .event("app_mention", listener_fn(|_args| async { Ok(()) }))
            .build()
            .unwrap();
        // Deferred: the listener never acks, so the deadline answers.
        let state = state_with(app, true, 50);

        let body = br#"{"event":{"type":"app_mention"}}"#.to_vec();
        let headers = signed_headers(&body);
        let response = handle_request(State(state), headers, Bytes::from(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let state = state_with(plain_app(), false, 3001);
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let response =
            handle_request(State(state), headers, Bytes::from_static(b"{broken")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
