//! # Switchboard Core
//!
//! The dispatch engine of the Switchboard Slack app framework.
//!
//! Every transport adapter (HTTP webhook, Socket Mode, serverless proxy)
//! converts its native request into one [`RawEvent`] and hands it to the
//! [`App`]. From there the pipeline is transport-independent:
//!
//! ```text
//! ┌───────────┐    ┌──────────┐    ┌───────────┐    ┌──────────────────┐
//! │  Adapter  │───▶│ Classify │───▶│ Authorize │───▶│ Middleware chains │
//! │ (any of 3)│    │  (probes)│    │ (external)│───▶│  (per listener)   │
//! └───────────┘    └──────────┘    └───────────┘    └──────────────────┘
//! ```
//!
//! - **Classification** runs a fixed, ordered probe sequence over the
//!   parsed body and yields an [`EventKind`] plus the conversation the
//!   payload pertains to.
//! - **Authorization** resolves the event to an installed-workspace
//!   identity through the app-supplied [`Authorizer`].
//! - **Dispatch** fans out to every matching listener entry; each entry
//!   gets a fresh chain of global middleware followed by its own, run in
//!   registration order with per-chain error isolation.
//! - **Acknowledgment** is a single-use [`AckHandle`] with identical
//!   at-most-once semantics on every transport.

pub mod ack;
pub mod app;
pub mod args;
pub mod auth;
pub mod client;
pub mod constraint;
pub mod context;
pub mod error;
pub mod event;
pub mod listener;
pub mod middleware;
pub mod registry;
pub mod store;

pub use ack::{AckFn, AckHandle};
pub use app::{App, AppBuilder};
pub use args::{
    ActionArgs, CommandArgs, DispatchArgs, EventArgs, OptionsArgs, Respond, Say, ShortcutArgs,
    ViewArgs,
};
pub use auth::{Authorization, AuthorizeSource, Authorizer, SingleTeam, authorizer_fn};
pub use client::{ApiClient, ApiTransport, ClientCache, DEFAULT_API_URL};
pub use constraint::{ConstraintSet, StringMatcher};
pub use context::Context;
pub use error::{Error, Result};
pub use event::{Classification, EventKind, RawEvent};
pub use listener::{BoxedMiddleware, ListenerArgs, Middleware, Next, listener_fn, middleware_fn};
pub use registry::{ListenerEntry, ListenerRegistry};
pub use store::{
    ConversationStore, InstallationStore, MemoryConversationStore, StateStore,
    conversation_context,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        AckHandle, App, Authorization, AuthorizeSource, ConstraintSet, Context, DispatchArgs,
        Error, EventKind, ListenerArgs, Next, RawEvent, Result, authorizer_fn, listener_fn,
        middleware_fn,
    };
}
