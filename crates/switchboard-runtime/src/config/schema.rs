//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchboardConfig {
    /// Platform credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Which inbound transport this deployment runs.
    #[serde(default)]
    pub transport: TransportConfig,

    /// API base URL override (tests, proxies).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_api_url() -> String {
    switchboard_core::DEFAULT_API_URL.to_string()
}

/// Platform credentials; usually supplied via environment variables
/// (`SLACK_BOT_TOKEN`, `SLACK_SIGNING_SECRET`, `SLACK_APP_TOKEN`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Bot token for the single-workspace authorizer and outbound calls.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Signing secret for webhook verification.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// App-level token for Socket Mode.
    #[serde(default)]
    pub app_token: Option<String>,
}

/// Inbound transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Signed HTTP webhooks.
    HttpServer(HttpServerConfig),

    /// Socket Mode over a persistent connection.
    SocketMode(SocketModeConfig),

    /// Serverless proxy invocations (the host drives each call).
    Serverless,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::HttpServer(HttpServerConfig::default())
    }
}

/// HTTP webhook server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Paths answering webhook deliveries.
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,

    /// Hold responses until the handler acks explicitly.
    #[serde(default)]
    pub deferred_ack: bool,

    /// Unhandled-request deadline in milliseconds.
    #[serde(default = "default_unhandled_timeout_ms")]
    pub unhandled_timeout_ms: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            paths: default_paths(),
            deferred_ack: false,
            unhandled_timeout_ms: default_unhandled_timeout_ms(),
        }
    }
}

impl HttpServerConfig {
    /// Converts to the transport-layer config.
    pub fn to_transport(&self, signing_secret: &str) -> switchboard_transport::HttpConfig {
        let mut config = switchboard_transport::HttpConfig::new(signing_secret);
        config.host = self.host.clone();
        config.port = self.port;
        config.paths = self.paths.clone();
        config.deferred_ack = self.deferred_ack;
        config.unhandled_timeout = Duration::from_millis(self.unhandled_timeout_ms);
        config
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_paths() -> Vec<String> {
    vec!["/slack/events".to_string()]
}

fn default_unhandled_timeout_ms() -> u64 {
    3001
}

/// Socket Mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeConfig {
    /// Reconnect after a dropped connection.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Reconnection backoff.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SocketModeConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            retry: RetryConfig::default(),
        }
    }
}

impl SocketModeConfig {
    /// Converts to the transport-layer config.
    pub fn to_transport(&self, app_token: &str) -> switchboard_transport::SocketConfig {
        let mut config = switchboard_transport::SocketConfig::new(app_token);
        config.auto_reconnect = self.auto_reconnect;
        config.retry = self.retry.to_transport();
        config
    }
}

fn default_auto_reconnect() -> bool {
    true
}

/// Reconnection backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum reconnect attempts; absent retries forever.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Converts to the transport-layer config.
    pub fn to_transport(&self) -> switchboard_transport::RetryConfig {
        switchboard_transport::RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The level name as tracing spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a tracing level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Base log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file path, for file output.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
