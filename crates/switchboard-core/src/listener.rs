//! Middleware chains and the continuation contract.
//!
//! A chain is an ordered sequence of [`Middleware`] sharing one event's
//! arguments. Each middleware must invoke its [`Next`] cursor to advance
//! the chain; returning without invoking it ends the chain without error.
//! that is the documented way to swallow an event (the ignore-self filter
//! works exactly like this). The cursor is an explicit value advanced by
//! each call, not a hidden captured index.
//!
//! A listener is just the terminal middleware of its chain: it receives
//! the same arguments and simply never calls the continuation.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::args::{
    ActionArgs, CommandArgs, DispatchArgs, EventArgs, OptionsArgs, ShortcutArgs, ViewArgs,
};
use crate::client::ApiClient;
use crate::context::Context;
use crate::error::Result;
use crate::event::EventKind;

// =============================================================================
// Chain Arguments
// =============================================================================

/// The arguments shared by every middleware in one event's chain.
#[derive(Clone)]
pub struct ListenerArgs {
    /// The full parsed body.
    pub body: Arc<Value>,
    /// The classified kind.
    pub kind: EventKind,
    /// The per-event context.
    pub context: Arc<Context>,
    /// The authorized outbound client, when a bot token resolved.
    pub client: Option<Arc<ApiClient>>,
    /// The kind-specific bundle (say/respond/ack).
    pub args: DispatchArgs,
}

impl ListenerArgs {
    /// The event bundle, when this is an Events API delivery.
    pub fn event(&self) -> Option<&EventArgs> {
        match &self.args {
            DispatchArgs::Event(a) => Some(a),
            _ => None,
        }
    }

    /// The action bundle, when this is an interactive delivery.
    pub fn action(&self) -> Option<&ActionArgs> {
        match &self.args {
            DispatchArgs::Action(a) => Some(a),
            _ => None,
        }
    }

    /// The command bundle, when this is a slash-command delivery.
    pub fn command(&self) -> Option<&CommandArgs> {
        match &self.args {
            DispatchArgs::Command(a) => Some(a),
            _ => None,
        }
    }

    /// The shortcut bundle.
    pub fn shortcut(&self) -> Option<&ShortcutArgs> {
        match &self.args {
            DispatchArgs::Shortcut(a) => Some(a),
            _ => None,
        }
    }

    /// The view bundle.
    pub fn view(&self) -> Option<&ViewArgs> {
        match &self.args {
            DispatchArgs::View(a) => Some(a),
            _ => None,
        }
    }

    /// The options bundle.
    pub fn options(&self) -> Option<&OptionsArgs> {
        match &self.args {
            DispatchArgs::Options(a) => Some(a),
            _ => None,
        }
    }

    /// Acknowledges the delivery without a payload.
    pub async fn ack(&self) -> Result<()> {
        self.args.ack_handle().ack(None).await
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// One link in a chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Processes the event. Call `next.run(args)` to advance the chain;
    /// return without calling it to end the chain.
    async fn handle(&self, args: ListenerArgs, next: Next) -> Result<()>;
}

/// A shared, type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The continuation cursor over the remainder of a chain.
///
/// Consumed by `run`, so a middleware can advance the chain at most once.
pub struct Next {
    remaining: Vec<BoxedMiddleware>,
}

impl Next {
    /// Creates a cursor over a full chain.
    pub fn over(chain: Vec<BoxedMiddleware>) -> Self {
        Self { remaining: chain }
    }

    /// Runs the rest of the chain to completion.
    pub async fn run(mut self, args: ListenerArgs) -> Result<()> {
        if self.remaining.is_empty() {
            return Ok(());
        }
        let head = self.remaining.remove(0);
        head.handle(args, Next { remaining: self.remaining }).await
    }

    /// How many links remain after this cursor.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

// =============================================================================
// Function Adapters
// =============================================================================

/// Wraps an async closure as pass-through-capable middleware.
///
/// ```ignore
/// let timing = middleware_fn(|args, next| async move {
///     let start = std::time::Instant::now();
///     let result = next.run(args).await;
///     tracing::debug!(elapsed = ?start.elapsed(), "chain finished");
///     result
/// });
/// ```
pub fn middleware_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(ListenerArgs, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    struct FnMiddleware<F>(F);

    #[async_trait]
    impl<F, Fut> Middleware for FnMiddleware<F>
    where
        F: Fn(ListenerArgs, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        async fn handle(&self, args: ListenerArgs, next: Next) -> Result<()> {
            (self.0)(args, next).await
        }
    }

    Arc::new(FnMiddleware(f))
}

/// Wraps an async closure as a terminal listener: it never advances the
/// chain.
pub fn listener_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(ListenerArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    middleware_fn(move |args, _next| f(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckHandle;
    use crate::auth::Authorization;
    use crate::error::Error;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc as StdArc;

    fn args() -> ListenerArgs {
        let body = StdArc::new(json!({"event": {"type": "message", "text": "hi"}}));
        let context = StdArc::new(Context::new(
            Authorization::default(),
            None,
            None,
            None,
        ));
        let transport: StdArc<dyn crate::client::ApiTransport> = StdArc::new(NullTransport);
        let args = DispatchArgs::build(
            EventKind::Event,
            &body,
            &context,
            None,
            &transport,
            AckHandle::noop(),
        );
        ListenerArgs {
            body,
            kind: EventKind::Event,
            context,
            client: None,
            args,
        }
    }

    struct NullTransport;

    #[async_trait]
    impl crate::client::ApiTransport for NullTransport {
        async fn post_json(
            &self,
            _url: &str,
            _token: Option<&str>,
            _body: Value,
        ) -> Result<Value> {
            Ok(json!({"ok": true}))
        }
    }

    fn recorder(log: &StdArc<Mutex<Vec<&'static str>>>, name: &'static str) -> BoxedMiddleware {
        let log = StdArc::clone(log);
        middleware_fn(move |args, next| {
            let log = StdArc::clone(&log);
            async move {
                log.lock().push(name);
                next.run(args).await
            }
        })
    }

    #[tokio::test]
    async fn chain_runs_in_order() {
        let log = StdArc::new(Mutex::new(Vec::new()));
        let chain = vec![
            recorder(&log, "first"),
            recorder(&log, "second"),
            recorder(&log, "third"),
        ];

        Next::over(chain).run(args()).await.unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn omitting_the_continuation_ends_the_chain() {
        let log = StdArc::new(Mutex::new(Vec::new()));
        let swallow = {
            let log = StdArc::clone(&log);
            middleware_fn(move |_args, _next| {
                let log = StdArc::clone(&log);
                async move {
                    log.lock().push("swallow");
                    Ok(())
                }
            })
        };
        let chain = vec![recorder(&log, "first"), swallow, recorder(&log, "never")];

        Next::over(chain).run(args()).await.unwrap();
        assert_eq!(*log.lock(), vec!["first", "swallow"]);
    }

    #[tokio::test]
    async fn listener_error_propagates() {
        let chain = vec![listener_fn(|_args| async {
            Err(Error::event_processing("boom"))
        })];
        let err = Next::over(chain).run(args()).await.unwrap_err();
        assert!(matches!(err, Error::EventProcessing(_)));
    }

    #[tokio::test]
    async fn empty_chain_is_a_no_op() {
        Next::over(Vec::new()).run(args()).await.unwrap();
    }
}
