//! Configuration loading and schema.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    CredentialsConfig, HttpServerConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    RetryConfig, SocketModeConfig, SwitchboardConfig, TransportConfig,
};
