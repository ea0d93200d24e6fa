//! # Switchboard Runtime
//!
//! Configuration loading, logging setup, and lifecycle orchestration for
//! Switchboard apps.
//!
//! ```rust,ignore
//! use switchboard_runtime::{ConfigLoader, Runtime, logging};
//! use switchboard_core::listener_fn;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let app = Runtime::app_builder(&config)?
//!         .command("/deploy", listener_fn(|args| async move {
//!             args.command().unwrap().ack_with("rolling out".into()).await
//!         }))
//!         .build()?;
//!
//!     Runtime::new(app, config).run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
mod runtime;

pub use config::{ConfigLoader, SwitchboardConfig};
pub use error::{ConfigError, ConfigResult, RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::Runtime;
