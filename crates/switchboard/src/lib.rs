//! # Switchboard
//!
//! A Slack app framework for Rust.
//!
//! ## Overview
//!
//! Switchboard receives inbound platform notifications over three
//! transports (signed HTTP webhooks, Socket Mode, and serverless proxy
//! invocations), normalizes them into one canonical event shape,
//! authorizes them against an installed-workspace identity, and
//! dispatches them through a middleware pipeline to listeners selected by
//! declarative constraints. Ordering, at-most-once acknowledgment, and
//! per-listener error isolation are identical on every transport.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌───────────────────────┐
//! │  HTTP server │────▶│                      │────▶│ chain: global + entry │──▶ say/respond/ack
//! │  Socket Mode │────▶│  App (classify,      │────▶│ chain: global + entry │──▶ say/respond/ack
//! │  Serverless  │────▶│  authorize, select)  │────▶│ chain: ...            │──▶ say/respond/ack
//! └──────────────┘     └──────────────────────┘     └───────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let app = Runtime::app_builder(&config)?
//!         .middleware(ignore_self())
//!         .message("hello", listener_fn(|args| async move {
//!             if let Some(say) = args.args.say() {
//!                 say.say("hi right back").await?;
//!             }
//!             Ok(())
//!         }))
//!         .build()?;
//!
//!     Runtime::new(app, config).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `http-server` *(default)*: signed HTTP webhook transport
//! - `socket-mode`: persistent Socket Mode transport
//! - `toml-config` *(default)* / `yaml-config`: config file formats
//! - `json-log`: JSON log output

pub use switchboard_core as core;
pub use switchboard_runtime as runtime;
pub use switchboard_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use switchboard_runtime::{ConfigLoader, Runtime, logging};

    // Engine - registration, context, args, errors
    pub use switchboard_core::{
        AckHandle, App, Authorization, AuthorizeSource, ConstraintSet, Context, DispatchArgs,
        Error, EventKind, ListenerArgs, Next, RawEvent, Result, StringMatcher, authorizer_fn,
        listener_fn, middleware_fn,
    };

    // Built-ins and collaborator interfaces
    pub use switchboard_core::middleware::ignore_self;
    pub use switchboard_core::{
        ConversationStore, InstallationStore, MemoryConversationStore, StateStore,
        conversation_context,
    };

    // Transport shapes apps touch directly
    pub use switchboard_transport::{ProxyEvent, ProxyResponse, ServerlessHandler};
}
