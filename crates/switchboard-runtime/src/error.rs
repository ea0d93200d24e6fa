//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The configuration could not be parsed or extracted.
    #[error("configuration error: {0}")]
    ParseError(String),

    /// The configuration is structurally valid but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised by the runtime lifecycle.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport startup or shutdown failure.
    #[error(transparent)]
    Transport(#[from] switchboard_transport::TransportError),

    /// App construction failure.
    #[error(transparent)]
    Core(#[from] switchboard_core::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
