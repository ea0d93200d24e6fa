//! The app: registration surface and the dispatch engine.
//!
//! An [`App`] is built once at startup. Every transport adapter feeds it
//! [`RawEvent`]s through [`App::dispatch`], which runs the same pipeline
//! regardless of transport:
//!
//! 1. Parse the body and classify it into an [`EventKind`].
//! 2. Build the source identity and invoke the [`Authorizer`] (or
//!    synthesize a minimal identity for bypass events).
//! 3. Build the per-event [`Context`] and kind-specific [`DispatchArgs`].
//! 4. Select every matching listener entry and run a fresh chain for each
//!    one: global middleware first, then the entry's own chain.
//! 5. Collect per-chain failures and merge them into one aggregate error.
//!
//! The acknowledgment contract, ordering, and error isolation are
//! identical on every transport; only the `RawEvent` construction and the
//! response rendering differ.

use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument, Level, debug, span};

use crate::ack::AckHandle;
use crate::args::DispatchArgs;
use crate::auth::{self, Authorization, Authorizer, SingleTeam};
use crate::client::{ApiClient, ApiTransport, ClientCache, DEFAULT_API_URL};
use crate::constraint::{ConstraintSet, StringMatcher};
use crate::context::{Context, MATCHES_KEY};
use crate::error::{Error, Result};
use crate::event::{self, EventKind, RawEvent};
use crate::listener::{BoxedMiddleware, ListenerArgs, Next};
use crate::registry::ListenerRegistry;

// =============================================================================
// Builder
// =============================================================================

/// Builds an [`App`].
///
/// Registration happens here, single-threaded, before the first dispatch;
/// the finished registry is immutable.
pub struct AppBuilder {
    registry: ListenerRegistry,
    authorizer: Option<Arc<dyn Authorizer>>,
    transport: Option<Arc<dyn ApiTransport>>,
    api_url: String,
}

impl AppBuilder {
    fn new() -> Self {
        Self {
            registry: ListenerRegistry::new(),
            authorizer: None,
            transport: None,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Uses a fixed single-workspace bot token (shorthand for a
    /// [`SingleTeam`] authorizer).
    pub fn token(self, bot_token: impl Into<String>) -> Self {
        self.authorizer(SingleTeam::new(bot_token))
    }

    /// Sets the authorizer resolving inbound events to installations.
    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    /// Sets the outbound wire transport (reqwest-backed in production).
    pub fn api_transport(mut self, transport: Arc<dyn ApiTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the API base URL (tests, proxies).
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Appends a global middleware; it runs ahead of every listener chain.
    pub fn middleware(mut self, middleware: BoxedMiddleware) -> Self {
        self.registry.add_global(middleware);
        self
    }

    /// Registers a listener under an explicit kind and constraint set,
    /// with its own middleware chain. The listener is the chain's last
    /// link.
    pub fn register(
        mut self,
        kind: EventKind,
        constraints: ConstraintSet,
        chain: Vec<BoxedMiddleware>,
    ) -> Self {
        self.registry.add_entry(kind, constraints, chain);
        self
    }

    /// Listens for an Events API event type.
    pub fn event(self, event_type: impl Into<StringMatcher>, listener: BoxedMiddleware) -> Self {
        self.register(
            EventKind::Event,
            ConstraintSet::new().event_type(event_type),
            vec![listener],
        )
    }

    /// Listens for messages whose text satisfies the matcher.
    pub fn message(self, text: impl Into<StringMatcher>, listener: BoxedMiddleware) -> Self {
        self.register(
            EventKind::Event,
            ConstraintSet::new().event_type("message").text(text),
            vec![listener],
        )
    }

    /// Listens for interactive actions by `action_id`.
    pub fn action(self, action_id: impl Into<StringMatcher>, listener: BoxedMiddleware) -> Self {
        self.register(
            EventKind::Action,
            ConstraintSet::new().action_id(action_id),
            vec![listener],
        )
    }

    /// Listens for a slash command.
    pub fn command(self, name: impl Into<StringMatcher>, listener: BoxedMiddleware) -> Self {
        self.register(
            EventKind::Command,
            ConstraintSet::new().command(name),
            vec![listener],
        )
    }

    /// Listens for a global or message shortcut by `callback_id`.
    pub fn shortcut(
        self,
        callback_id: impl Into<StringMatcher>,
        listener: BoxedMiddleware,
    ) -> Self {
        self.register(
            EventKind::Shortcut,
            ConstraintSet::new().callback_id(callback_id),
            vec![listener],
        )
    }

    /// Listens for view submissions/closures by `callback_id`.
    pub fn view(self, callback_id: impl Into<StringMatcher>, listener: BoxedMiddleware) -> Self {
        self.register(
            EventKind::View,
            ConstraintSet::new().callback_id(callback_id),
            vec![listener],
        )
    }

    /// Listens for select-menu options requests by `action_id`.
    pub fn options(self, action_id: impl Into<StringMatcher>, listener: BoxedMiddleware) -> Self {
        self.register(
            EventKind::Options,
            ConstraintSet::new().action_id(action_id),
            vec![listener],
        )
    }

    /// Finishes construction.
    pub fn build(self) -> Result<App> {
        let authorizer = self.authorizer.ok_or_else(|| {
            Error::Initialization(
                "an authorizer (or a bot token) is required".to_string(),
            )
        })?;
        let transport = self.transport.ok_or_else(|| {
            Error::Initialization("an api transport is required".to_string())
        })?;
        let clients = ClientCache::new(Arc::clone(&transport), self.api_url);
        Ok(App {
            registry: self.registry,
            authorizer,
            transport,
            clients,
        })
    }
}

// =============================================================================
// App
// =============================================================================

/// The dispatch engine shared by every transport adapter.
pub struct App {
    registry: ListenerRegistry,
    authorizer: Arc<dyn Authorizer>,
    transport: Arc<dyn ApiTransport>,
    clients: ClientCache,
}

impl App {
    /// Starts building an app.
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// The outbound wire transport, shared with adapters that make their
    /// own API calls (Socket Mode connection opening).
    pub fn api_transport(&self) -> Arc<dyn ApiTransport> {
        Arc::clone(&self.transport)
    }

    /// Returns the cached client for a token, creating it on first use.
    /// The cache belongs to this app instance.
    pub fn client_for(&self, token: &str) -> Arc<ApiClient> {
        self.clients.get_or_create(token)
    }

    /// Processes one inbound delivery.
    ///
    /// Unrecognized payload shapes are not errors: they are logged and no
    /// listener runs. Authorization and body-parse failures propagate to
    /// the calling adapter, which owns their translation into a
    /// transport-native response.
    pub async fn dispatch(&self, raw: RawEvent) -> Result<()> {
        if raw.body.is_empty() {
            return Err(Error::event_processing("empty request body"));
        }
        let body: Value = serde_json::from_slice(&raw.body)
            .map_err(|e| Error::event_processing(format!("body is not valid JSON: {e}")))?;

        let Some(classification) = event::classify(&body) else {
            debug!("Unrecognized payload shape, no listeners invoked");
            return Ok(());
        };
        let kind = classification.kind;

        let span = span!(Level::DEBUG, "dispatch", kind = %kind);
        self.dispatch_classified(classification, body, raw)
            .instrument(span)
            .await
    }

    /// The post-classification pipeline: authorize, build context/args,
    /// select, fan out, aggregate.
    async fn dispatch_classified(
        &self,
        classification: event::Classification,
        body: Value,
        raw: RawEvent,
    ) -> Result<()> {
        let kind = classification.kind;
        let source = auth::build_source(kind, &body, classification.conversation_id.clone());
        let authorization = if event::bypasses_authorize(&body) {
            debug!("Authorization bypassed for uninstall-class event");
            Authorization::minimal(&source)
        } else {
            self.authorizer
                .authorize(&source, &body)
                .await
                .map_err(|e| match e {
                    Error::Authorization { .. } => e,
                    other => Error::authorization(other.to_string()),
                })?
        };

        let context = Arc::new(Context::new(
            authorization,
            classification.conversation_id,
            raw.retry_num(),
            raw.retry_reason().map(str::to_string),
        ));
        let client = context
            .bot_token
            .as_deref()
            .map(|token| self.clients.get_or_create(token));

        let body = Arc::new(body);
        let args = DispatchArgs::build(
            kind,
            &body,
            &context,
            client.as_ref(),
            &self.transport,
            raw.ack.clone(),
        );
        let listener_args = ListenerArgs {
            body: Arc::clone(&body),
            kind,
            context: Arc::clone(&context),
            client,
            args,
        };

        let selections = self.registry.select(kind, &body);
        debug!(matched = selections.len(), "Selected listener entries");

        let mut errors = Vec::new();
        if selections.is_empty() {
            // Global middleware still observes unmatched events.
            if let Err(err) = Next::over(self.registry.empty_chain())
                .run(listener_args.clone())
                .await
            {
                errors.push(err);
            }
        } else {
            for selection in selections {
                if !selection.captures.is_empty() {
                    context.set(MATCHES_KEY, Value::from(selection.captures.clone()));
                }
                let chain = self.registry.chain_for(selection.entry);
                // One chain's failure never aborts its siblings.
                if let Err(err) = Next::over(chain).run(listener_args.clone()).await {
                    errors.push(err);
                }
            }
        }

        Error::aggregate(errors)
    }

    /// Dispatches a body that is already parsed bytes with no transport
    /// metadata, acknowledging into the given handle. Convenience for
    /// adapters and tests.
    pub async fn dispatch_body(&self, body: Vec<u8>, ack: AckHandle) -> Result<()> {
        self.dispatch(RawEvent::new(body, Default::default(), ack))
            .await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("listeners", &self.registry.len())
            .field("cached_clients", &self.clients.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::listener_fn;
    use async_trait::async_trait;
    use regex::Regex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullTransport;

    #[async_trait]
    impl ApiTransport for NullTransport {
        async fn post_json(
            &self,
            _url: &str,
            _token: Option<&str>,
            _body: Value,
        ) -> Result<Value> {
            Ok(json!({"ok": true}))
        }
    }

    fn builder() -> AppBuilder {
        App::builder()
            .token("xoxb-test")
            .api_transport(Arc::new(NullTransport))
    }

    fn counting_listener(counter: &Arc<AtomicUsize>) -> BoxedMiddleware {
        let counter = Arc::clone(counter);
        listener_fn(move |_args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn raw(body: Value) -> RawEvent {
        RawEvent::new(body.to_string().into_bytes(), Default::default(), AckHandle::noop())
    }

    #[tokio::test]
    async fn unknown_payload_invokes_nothing_and_succeeds() {
        let counter = Arc::new(AtomicUsize::new(0));
        let app = builder()
            .event("message", counting_listener(&counter))
            .build()
            .unwrap();

        app.dispatch(raw(json!({"unrelated": true}))).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let app = builder().build().unwrap();
        let err = app
            .dispatch(RawEvent::new(Vec::new(), Default::default(), AckHandle::noop()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EventProcessing(_)));
    }

    #[tokio::test]
    async fn fan_out_hits_only_matching_patterns() {
        let hello = Arc::new(AtomicUsize::new(0));
        let goodbye = Arc::new(AtomicUsize::new(0));
        let global = Arc::new(AtomicUsize::new(0));

        let global_counter = Arc::clone(&global);
        let app = builder()
            .middleware(crate::listener::middleware_fn(move |args, next| {
                let global_counter = Arc::clone(&global_counter);
                async move {
                    global_counter.fetch_add(1, Ordering::SeqCst);
                    next.run(args).await
                }
            }))
            .message(Regex::new("hello").unwrap(), counting_listener(&hello))
            .message(Regex::new("goodbye").unwrap(), counting_listener(&goodbye))
            .build()
            .unwrap();

        app.dispatch(raw(json!({
            "event": {"type": "message", "text": "hello"}
        })))
        .await
        .unwrap();

        assert_eq!(hello.load(Ordering::SeqCst), 1);
        assert_eq!(goodbye.load(Ordering::SeqCst), 0);
        // Global middleware runs once per matching chain.
        assert_eq!(global.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_chain_is_isolated_and_aggregated() {
        let survivor = Arc::new(AtomicUsize::new(0));
        let app = builder()
            .event(
                "app_mention",
                listener_fn(|_args| async { Err(Error::event_processing("boom")) }),
            )
            .event("app_mention", counting_listener(&survivor))
            .build()
            .unwrap();

        let err = app
            .dispatch(raw(json!({"event": {"type": "app_mention"}})))
            .await
            .unwrap_err();

        match &err {
            Error::Aggregate(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
        // The succeeding sibling still ran.
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmatched_event_still_reaches_global_middleware() {
        let global = Arc::new(AtomicUsize::new(0));
        let global_counter = Arc::clone(&global);
        let app = builder()
            .middleware(crate::listener::middleware_fn(move |args, next| {
                let global_counter = Arc::clone(&global_counter);
                async move {
                    global_counter.fetch_add(1, Ordering::SeqCst);
                    next.run(args).await
                }
            }))
            .build()
            .unwrap();

        app.dispatch(raw(json!({"event": {"type": "team_join"}})))
            .await
            .unwrap();
        assert_eq!(global.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn captures_reach_the_context() {
        let app = builder()
            .message(
                Regex::new(r"deploy (\w+)").unwrap(),
                listener_fn(|args| async move {
                    let matches = args.context.matches().expect("captures should be set");
                    assert_eq!(matches[1], "prod");
                    Ok(())
                }),
            )
            .build()
            .unwrap();

        app.dispatch(raw(json!({
            "event": {"type": "message", "text": "deploy prod"}
        })))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn authorize_failure_aborts_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let app = App::builder()
            .authorizer(crate::auth::authorizer_fn(|_source, _body| async {
                Err(Error::authorization("no installation"))
            }))
            .api_transport(Arc::new(NullTransport))
            .event("message", counting_listener(&counter))
            .build()
            .unwrap();

        let err = app
            .dispatch(raw(json!({"event": {"type": "message", "text": "hi"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authorization { .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn uninstall_events_skip_the_authorizer() {
        let counter = Arc::new(AtomicUsize::new(0));
        let app = App::builder()
            .authorizer(crate::auth::authorizer_fn(|_source, _body| async {
                Err(Error::authorization("must not be called"))
            }))
            .api_transport(Arc::new(NullTransport))
            .event("app_uninstalled", counting_listener(&counter))
            .build()
            .unwrap();

        app.dispatch(raw(json!({
            "team_id": "T1",
            "event": {"type": "app_uninstalled"}
        })))
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn builder_requires_an_authorizer() {
        let err = App::builder()
            .api_transport(Arc::new(NullTransport))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
    }
}
