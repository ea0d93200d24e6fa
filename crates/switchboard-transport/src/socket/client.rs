//! Socket Mode connection management.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use switchboard_core::{AckHandle, App, RawEvent};

use crate::error::{TransportError, TransportResult};
use crate::socket::{Envelope, SocketConfig, ack_frame, validate_wss_url};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// The Socket Mode transport adapter.
pub struct SocketModeClient {
    app: Arc<App>,
    config: SocketConfig,
}

/// A running Socket Mode connection; call [`ConnectionHandle::shutdown`]
/// to close it.
pub struct ConnectionHandle {
    shutdown_tx: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
    dispatches: TaskTracker,
}

impl ConnectionHandle {
    /// Closes the connection, stops reconnecting, and waits for the
    /// receive loop and in-flight envelope dispatches to wind down.
    /// Whatever they failed to ack is redelivered by the platform on the
    /// next connection.
    pub async fn shutdown(self) {
        info!("Socket Mode client shutting down");
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
        self.dispatches.close();
        self.dispatches.wait().await;
    }
}

impl SocketModeClient {
    /// Creates the adapter over a shared app.
    pub fn new(app: Arc<App>, config: SocketConfig) -> Self {
        Self { app, config }
    }

    /// Opens the initial connection and spawns the receive loop.
    pub async fn start(&self) -> TransportResult<ConnectionHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatches = TaskTracker::new();

        let (ws_tx, ws_rx) = self.connect().await?;

        let app = Arc::clone(&self.app);
        let config = self.config.clone();
        let join = tokio::spawn(run_client_loop(
            app,
            config,
            ws_tx,
            ws_rx,
            shutdown_rx,
            dispatches.clone(),
        ));

        Ok(ConnectionHandle {
            shutdown_tx,
            join,
            dispatches,
        })
    }

    /// Obtains a fresh connection URL and connects.
    async fn connect(&self) -> TransportResult<(WsSink, WsSource)> {
        let url = open_connection_url(&self.app, &self.config.app_token).await?;
        validate_wss_url(&url)?;

        info!("Socket Mode connecting");
        let (stream, _response) =
            connect_async(&url)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url,
                    reason: e.to_string(),
                })?;
        info!("Socket Mode connected");
        Ok(stream.split())
    }
}

/// Calls `apps.connections.open` with the app-level token.
async fn open_connection_url(app: &App, app_token: &str) -> TransportResult<String> {
    let client = app.client_for(app_token);
    let response = client
        .call("apps.connections.open", serde_json::json!({}))
        .await?;
    response
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TransportError::ConnectionClosed {
            reason: "apps.connections.open returned no URL".to_string(),
        })
}

/// The connection loop: receives frames, fans each envelope out to its own
/// dispatch task, and reconnects with backoff when the connection drops.
async fn run_client_loop(
    app: Arc<App>,
    config: SocketConfig,
    mut ws_tx: WsSink,
    mut ws_rx: WsSource,
    mut shutdown_rx: watch::Receiver<bool>,
    dispatches: TaskTracker,
) {
    // Outbound frames (acks) funnel through one channel so dispatch tasks
    // never touch the sink directly.
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(256);
    let mut retry_count = 0u32;
    let mut current_delay = config.retry.initial_delay;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped handle counts as a shutdown request.
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = ws_tx.close().await;
                    break;
                }
            }

            Some(frame) = frame_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!(error = %e, "Failed to send ack frame");
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&app, text.as_str(), &frame_tx, &dispatches);
                        retry_count = 0;
                        current_delay = config.retry.initial_delay;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) | Some(Ok(Message::Frame(_))) => {
                        trace!("Ignoring non-text frame");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Socket Mode connection ended");
                        match try_reconnect(
                            &app, &config, &mut retry_count, &mut current_delay,
                        ).await {
                            Some((new_tx, new_rx)) => {
                                ws_tx = new_tx;
                                ws_rx = new_rx;
                            }
                            None => break,
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Socket Mode read error");
                        match try_reconnect(
                            &app, &config, &mut retry_count, &mut current_delay,
                        ).await {
                            Some((new_tx, new_rx)) => {
                                ws_tx = new_tx;
                                ws_rx = new_rx;
                            }
                            None => break,
                        }
                    }
                }
            }
        }
    }
}

/// Handles one inbound text frame: control frames are consumed here,
/// envelopes become raw events dispatched on their own task.
fn handle_frame(
    app: &Arc<App>,
    text: &str,
    frame_tx: &mpsc::Sender<String>,
    dispatches: &TaskTracker,
) {
    let raw: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Unparseable Socket Mode frame");
            return;
        }
    };

    match raw.get("type").and_then(Value::as_str).unwrap_or("") {
        "hello" => {
            info!("Socket Mode hello received");
            return;
        }
        "disconnect" => {
            // The platform asks for a connection refresh; the receive loop
            // notices the closing stream and reconnects.
            let reason = raw
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            info!(reason, "Socket Mode disconnect requested");
            return;
        }
        _ => {}
    }

    let envelope: Envelope = match serde_json::from_value(raw) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "Envelope parse error");
            return;
        }
    };

    debug!(
        envelope_type = %envelope.envelope_type,
        envelope_id = %envelope.envelope_id,
        "Received envelope"
    );

    let headers = envelope.retry_headers();
    let body = envelope.payload.to_string().into_bytes();
    let ack = envelope_ack(envelope.envelope_id.clone(), frame_tx.clone());

    let app = Arc::clone(app);
    dispatches.spawn(async move {
        let ack_fallback = ack.clone();
        match app.dispatch(RawEvent::new(body, headers, ack)).await {
            Ok(()) => {
                // Unlike HTTP there is nothing to defer for: an un-acked
                // envelope would simply be redelivered, so ack on return.
                if !ack_fallback.is_acked() {
                    let _ = ack_fallback.ack(None).await;
                }
            }
            Err(err) => {
                error!(error = %err, "Dispatch failed for envelope");
            }
        }
    });
}

/// Builds the ack handle for one envelope: the effect queues an ack frame
/// referencing the envelope id on the shared connection.
fn envelope_ack(envelope_id: String, frame_tx: mpsc::Sender<String>) -> AckHandle {
    AckHandle::new(Arc::new(move |payload| {
        let frame = ack_frame(&envelope_id, payload.as_ref());
        let frame_tx = frame_tx.clone();
        Box::pin(async move {
            frame_tx.send(frame).await.map_err(|_| {
                switchboard_core::Error::event_processing("socket connection closed before ack")
            })
        })
    }))
}

/// Attempts to reconnect with exponential backoff. Returns `None` once the
/// policy gives up (or reconnection is disabled).
async fn try_reconnect(
    app: &Arc<App>,
    config: &SocketConfig,
    retry_count: &mut u32,
    current_delay: &mut Duration,
) -> Option<(WsSink, WsSource)> {
    if !config.auto_reconnect {
        return None;
    }

    loop {
        if let Some(max) = config.retry.max_retries {
            if *retry_count >= max {
                error!("Max reconnect attempts reached, giving up");
                return None;
            }
        }

        warn!(delay = ?current_delay, "Reconnecting Socket Mode");
        tokio::time::sleep(*current_delay).await;

        let client = SocketModeClient {
            app: Arc::clone(app),
            config: config.clone(),
        };
        match client.connect().await {
            Ok(streams) => {
                *retry_count = 0;
                *current_delay = config.retry.initial_delay;
                return Some(streams);
            }
            Err(e) => {
                warn!(error = %e, "Reconnection failed");
                *retry_count += 1;
                *current_delay = config.retry.next_delay(*current_delay);
            }
        }
    }
}
