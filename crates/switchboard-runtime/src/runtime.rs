//! Runtime lifecycle orchestration.
//!
//! The runtime owns the wiring between configuration, the app, and the
//! configured inbound transport:
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().load()?;
//! logging::init_from_config(&config.logging);
//!
//! let app = Runtime::app_builder(&config)?
//!     .message("hello", listener_fn(|args| async move {
//!         args.event().unwrap().say.as_ref().unwrap().say("hi back").await?;
//!         Ok(())
//!     }))
//!     .build()?;
//!
//! Runtime::new(app, config).run().await?;
//! ```
//!
//! `run` starts the transport, waits for SIGINT/SIGTERM, then stops it:
//! the port or connection is released and in-flight dispatches finish
//! before `run` returns.

use std::sync::Arc;

use tracing::info;

use switchboard_core::{App, AppBuilder};
use switchboard_transport::ReqwestTransport;

use crate::config::{SwitchboardConfig, TransportConfig};
use crate::error::{ConfigError, RuntimeResult};

/// The Switchboard runtime.
pub struct Runtime {
    config: SwitchboardConfig,
    app: Arc<App>,
}

impl Runtime {
    /// Creates a runtime over a built app.
    pub fn new(app: App, config: SwitchboardConfig) -> Self {
        Self {
            config,
            app: Arc::new(app),
        }
    }

    /// Pre-wires an [`AppBuilder`] from configuration: the production API
    /// transport, the configured API base URL, and (when a bot token is
    /// configured) the single-workspace authorizer. Installation-store
    /// deployments call `.authorizer(...)` on the result instead.
    pub fn app_builder(config: &SwitchboardConfig) -> RuntimeResult<AppBuilder> {
        let transport = ReqwestTransport::new()?;
        let mut builder = App::builder()
            .api_transport(Arc::new(transport))
            .api_url(config.api_url.clone());
        if let Some(token) = &config.credentials.bot_token {
            builder = builder.token(token.clone());
        }
        Ok(builder)
    }

    /// The shared app.
    pub fn app(&self) -> Arc<App> {
        Arc::clone(&self.app)
    }

    /// Builds the serverless adapter for function entry points.
    pub fn serverless_handler(
        &self,
    ) -> RuntimeResult<switchboard_transport::ServerlessHandler> {
        let secret = self.signing_secret()?;
        Ok(switchboard_transport::ServerlessHandler::new(
            self.app(),
            secret,
        ))
    }

    /// Starts the configured transport and blocks until shutdown.
    pub async fn run(&self) -> RuntimeResult<()> {
        match &self.config.transport {
            TransportConfig::HttpServer(http) => self.run_http(http).await,
            TransportConfig::SocketMode(socket) => self.run_socket_mode(socket).await,
            TransportConfig::Serverless => {
                // The function host invokes the handler per call; there is
                // nothing to start here.
                info!(
                    "Serverless transport: use `serverless_handler()` from the function entry point"
                );
                Ok(())
            }
        }
    }

    #[cfg(feature = "http-server")]
    async fn run_http(&self, http: &crate::config::HttpServerConfig) -> RuntimeResult<()> {
        let secret = self.signing_secret()?;
        let server =
            switchboard_transport::HttpServer::new(self.app(), http.to_transport(&secret));
        let handle = server.start().await?;
        wait_for_shutdown().await;
        handle.shutdown().await;
        Ok(())
    }

    #[cfg(not(feature = "http-server"))]
    async fn run_http(&self, _http: &crate::config::HttpServerConfig) -> RuntimeResult<()> {
        Err(ConfigError::Invalid(
            "http-server transport configured but the `http-server` feature is disabled"
                .to_string(),
        )
        .into())
    }

    #[cfg(feature = "socket-mode")]
    async fn run_socket_mode(
        &self,
        socket: &crate::config::SocketModeConfig,
    ) -> RuntimeResult<()> {
        let app_token = self.config.credentials.app_token.clone().ok_or_else(|| {
            ConfigError::Invalid("socket-mode transport requires credentials.app_token".to_string())
        })?;
        let client = switchboard_transport::SocketModeClient::new(
            self.app(),
            socket.to_transport(&app_token),
        );
        let handle = client.start().await?;
        wait_for_shutdown().await;
        handle.shutdown().await;
        Ok(())
    }

    #[cfg(not(feature = "socket-mode"))]
    async fn run_socket_mode(
        &self,
        _socket: &crate::config::SocketModeConfig,
    ) -> RuntimeResult<()> {
        Err(ConfigError::Invalid(
            "socket-mode transport configured but the `socket-mode` feature is disabled"
                .to_string(),
        )
        .into())
    }

    fn signing_secret(&self) -> RuntimeResult<String> {
        self.config
            .credentials
            .signing_secret
            .clone()
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "webhook transports require credentials.signing_secret".to_string(),
                )
                .into()
            })
    }
}

/// Completes on SIGINT or, on unix, SIGTERM.
#[cfg_attr(not(any(feature = "http-server", feature = "socket-mode")), allow(dead_code))]
async fn wait_for_shutdown() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt, shutting down"),
        _ = terminate => info!("Received terminate, shutting down"),
    }
}
