//! Collaborator storage interfaces.
//!
//! The engine does not persist anything itself. Conversation state,
//! installations, and OAuth state live behind these traits; the only piece
//! the core ships is an in-memory conversation store and the global
//! middleware that wires a store into the pipeline (run like any other
//! middleware).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::context::CONVERSATION_KEY;
use crate::error::Result;
use crate::listener::{BoxedMiddleware, middleware_fn};

// =============================================================================
// Conversation Store
// =============================================================================

/// Keyed conversation-state storage with optional expiry.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Loads the state for a conversation, if present and unexpired.
    async fn get(&self, conversation_id: &str) -> Result<Option<Value>>;

    /// Stores the state for a conversation, optionally expiring it.
    async fn set(
        &self,
        conversation_id: &str,
        value: Value,
        expires_in: Option<Duration>,
    ) -> Result<()>;

    /// Removes the state for a conversation.
    async fn delete(&self, conversation_id: &str) -> Result<()>;
}

/// A process-local conversation store.
///
/// Suitable for single-instance deployments and tests; anything serious
/// should implement [`ConversationStore`] over real storage.
#[derive(Default)]
pub struct MemoryConversationStore {
    entries: Mutex<HashMap<String, (Value, Option<Instant>)>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<Value>> {
        let mut entries = self.entries.lock();
        match entries.get(conversation_id) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                entries.remove(conversation_id);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        conversation_id: &str,
        value: Value,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        let deadline = expires_in.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(conversation_id.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        self.entries.lock().remove(conversation_id);
        Ok(())
    }
}

/// Global middleware that loads conversation state into the context bag
/// under [`CONVERSATION_KEY`] before the chain runs.
///
/// Handlers persist updates through the store handle they capture; this
/// middleware only does the read side, and skips events with no resolved
/// conversation.
pub fn conversation_context(store: Arc<dyn ConversationStore>) -> BoxedMiddleware {
    middleware_fn(move |args, next| {
        let store = Arc::clone(&store);
        async move {
            if let Some(conversation_id) = args.context.conversation_id() {
                match store.get(&conversation_id).await {
                    Ok(Some(state)) => {
                        args.context.set(CONVERSATION_KEY, state);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            conversation_id = %conversation_id,
                            error = %err,
                            "Failed to load conversation state"
                        );
                    }
                }
            }
            next.run(args).await
        }
    })
}

// =============================================================================
// Installation / OAuth State Interfaces
// =============================================================================

/// Persistence for workspace installations.
///
/// Consumed by authorizers and by the OAuth sub-flow; the engine itself
/// never writes installations.
#[async_trait]
pub trait InstallationStore: Send + Sync {
    /// Loads the installation for a workspace (and enterprise, when set).
    async fn fetch(
        &self,
        team_id: Option<&str>,
        enterprise_id: Option<&str>,
    ) -> Result<Option<Value>>;

    /// Persists an installation record.
    async fn save(&self, installation: Value) -> Result<()>;

    /// Deletes the installation for a workspace.
    async fn delete(&self, team_id: Option<&str>, enterprise_id: Option<&str>) -> Result<()>;
}

/// Short-lived OAuth state parameters.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Issues a state parameter, valid for `expires_in`.
    async fn issue(&self, expires_in: Duration) -> Result<String>;

    /// Consumes a state parameter, failing if unknown or expired.
    async fn consume(&self, state: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack::AckHandle;
    use crate::args::DispatchArgs;
    use crate::auth::Authorization;
    use crate::context::Context;
    use crate::event::EventKind;
    use crate::listener::{ListenerArgs, Next, listener_fn};
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryConversationStore::new();
        store.set("C1", json!({"step": 2}), None).await.unwrap();
        assert_eq!(store.get("C1").await.unwrap(), Some(json!({"step": 2})));

        store.delete("C1").await.unwrap();
        assert_eq!(store.get("C1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_vanish() {
        let store = MemoryConversationStore::new();
        store
            .set("C1", json!(1), Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(store.get("C1").await.unwrap(), None);
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

    fn args_for_conversation(conversation: Option<&str>) -> ListenerArgs {
        let body = Arc::new(json!({"event": {"type": "message", "text": "hi"}}));
        let context = Arc::new(Context::new(
            Authorization::default(),
            conversation.map(str::to_string),
            None,
            None,
        ));
        let transport: Arc<dyn crate::client::ApiTransport> = Arc::new(NullTransport);
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

    #[tokio::test]
    async fn conversation_middleware_loads_state_into_the_bag() {
        let store = Arc::new(MemoryConversationStore::new());
        store.set("C1", json!({"step": 3}), None).await.unwrap();

        let chain = vec![
            conversation_context(store),
            listener_fn(|args| async move {
                assert_eq!(args.context.get(CONVERSATION_KEY), Some(json!({"step": 3})));
                Ok(())
            }),
        ];
        Next::over(chain).run(args_for_conversation(Some("C1"))).await.unwrap();
    }

    #[tokio::test]
    async fn conversation_middleware_skips_events_without_a_conversation() {
        let store = Arc::new(MemoryConversationStore::new());
        let chain = vec![
            conversation_context(store),
            listener_fn(|args| async move {
                assert!(args.context.get(CONVERSATION_KEY).is_none());
                Ok(())
            }),
        ];
        Next::over(chain).run(args_for_conversation(None)).await.unwrap();
    }
}
