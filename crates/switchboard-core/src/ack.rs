//! Single-use acknowledgment handles.
//!
//! Every transport produces one [`AckHandle`] per inbound delivery. The
//! first invocation wins: a handler-issued ack racing an adapter
//! timeout-triggered auto-ack is settled by an atomic swap, so exactly one
//! side runs the transport effect. Every later invocation fails with
//! [`Error::MultipleAck`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{Error, Result};

/// The transport-specific acknowledgment effect.
///
/// HTTP writes a response, Socket Mode sends an ack frame, the serverless
/// adapter records the status for its synchronous return value.
pub type AckFn =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static>;

/// A single-use acknowledgment for one inbound delivery.
///
/// Cloning shares the used-flag: all clones observe the same
/// at-most-once guarantee.
#[derive(Clone)]
pub struct AckHandle {
    inner: Arc<AckInner>,
}

struct AckInner {
    used: AtomicBool,
    effect: AckFn,
}

impl AckHandle {
    /// Creates a handle wrapping a transport effect.
    pub fn new(effect: AckFn) -> Self {
        Self {
            inner: Arc::new(AckInner {
                used: AtomicBool::new(false),
                effect,
            }),
        }
    }

    /// Creates a handle whose effect does nothing.
    ///
    /// Useful for synthesized events and tests.
    pub fn noop() -> Self {
        Self::new(Arc::new(|_| Box::pin(async { Ok(()) })))
    }

    /// Acknowledges the delivery, optionally with a response payload.
    ///
    /// The first call runs the transport effect; any later call returns
    /// [`Error::MultipleAck`] without touching the transport.
    pub async fn ack(&self, payload: Option<Value>) -> Result<()> {
        if self.inner.used.swap(true, Ordering::SeqCst) {
            return Err(Error::MultipleAck);
        }
        (self.inner.effect)(payload).await
    }

    /// Whether this delivery has been acknowledged.
    pub fn is_acked(&self) -> bool {
        self.inner.used.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("used", &self.is_acked())
            .finish()
    }
}
