//! # Switchboard Transport
//!
//! The three inbound transports of the Switchboard framework, plus the
//! outbound wire transport backing the API client cache.
//!
//! Each adapter converts its native request into the engine's canonical
//! [`RawEvent`](switchboard_core::RawEvent) shape and renders the
//! transport-native response from the shared acknowledgment contract:
//!
//! | Adapter | Feature | Inbound | Response |
//! |---------|---------|---------|----------|
//! | [`http::server::HttpServer`] | `http-server` | signed webhook POST | HTTP status/body |
//! | [`socket::SocketModeClient`] | `socket-mode` | enveloped WS frames | ack frame |
//! | [`serverless::ServerlessHandler`] | always | proxy invocation | proxy response |
//!
//! The `api-client` feature provides
//! [`http::client::ReqwestTransport`], the production implementation of
//! the engine's outbound primitive.

pub mod body;
pub mod error;
pub mod http;
pub mod serverless;
pub mod signature;
pub mod socket;

pub use error::{TransportError, TransportResult};
pub use serverless::{ProxyEvent, ProxyResponse, ServerlessHandler};
pub use signature::{SIGNATURE_HEADER, SignatureVerifier, TIMESTAMP_HEADER};

#[cfg(feature = "http-server")]
pub use http::server::{HttpServer, ListenerHandle};

#[cfg(feature = "api-client")]
pub use http::client::ReqwestTransport;

#[cfg(feature = "socket-mode")]
pub use socket::{ConnectionHandle, SocketModeClient};

pub use http::HttpConfig;
pub use socket::{Envelope, RetryConfig, SocketConfig};
