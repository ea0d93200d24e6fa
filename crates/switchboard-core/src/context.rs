//! Per-event context shared along a middleware chain.
//!
//! A [`Context`] is created fresh for every inbound delivery, carries the
//! resolved installation identity and retry metadata, and is discarded
//! after dispatch; it is never shared across events. The extension bag
//! gives middleware a place to hand values down the chain (the resolved
//! conversation, regex capture groups, conversation state, authorizer
//! custom properties).

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::auth::Authorization;

/// Reserved extension key for regex capture groups written by pattern
/// constraints.
pub const MATCHES_KEY: &str = "matches";
/// Reserved extension key for conversation state loaded by the
/// conversation middleware.
pub const CONVERSATION_KEY: &str = "conversation";

/// The per-event record handed to every middleware and listener.
pub struct Context {
    /// Bot token resolved for the event's workspace, if any.
    pub bot_token: Option<String>,
    /// The bot's own app id within the workspace.
    pub bot_id: Option<String>,
    /// The bot's user id (used by the ignore-self filter).
    pub bot_user_id: Option<String>,
    /// User token, when the installation authorized one.
    pub user_token: Option<String>,
    /// The acting user's id.
    pub user_id: Option<String>,
    /// Workspace id.
    pub team_id: Option<String>,
    /// Enterprise (org) id for enterprise installs.
    pub enterprise_id: Option<String>,
    /// Whether this installation is enterprise-wide.
    pub is_enterprise_install: bool,
    /// Delivery retry count reported by the transport.
    pub retry_num: Option<u32>,
    /// Delivery retry reason reported by the transport.
    pub retry_reason: Option<String>,
    /// The conversation this event was normalized to, if any.
    conversation_id: RwLock<Option<String>>,
    /// Extension bag for chain-scoped values.
    extensions: RwLock<HashMap<String, Value>>,
}

impl Context {
    /// Builds a context from an authorization result plus transport retry
    /// metadata. Authorizer-supplied custom properties are merged into the
    /// extension bag.
    pub fn new(
        auth: Authorization,
        conversation_id: Option<String>,
        retry_num: Option<u32>,
        retry_reason: Option<String>,
    ) -> Self {
        let mut extensions = HashMap::new();
        for (key, value) in auth.custom {
            extensions.insert(key, value);
        }
        Self {
            bot_token: auth.bot_token,
            bot_id: auth.bot_id,
            bot_user_id: auth.bot_user_id,
            user_token: auth.user_token,
            user_id: auth.user_id,
            team_id: auth.team_id,
            enterprise_id: auth.enterprise_id,
            is_enterprise_install: auth.is_enterprise_install,
            retry_num,
            retry_reason,
            conversation_id: RwLock::new(conversation_id),
            extensions: RwLock::new(extensions),
        }
    }

    /// The conversation recorded for this event, if any.
    pub fn conversation_id(&self) -> Option<String> {
        self.conversation_id.read().clone()
    }

    /// Overrides the recorded conversation (middleware may re-resolve it).
    pub fn set_conversation_id(&self, id: impl Into<String>) {
        *self.conversation_id.write() = Some(id.into());
    }

    /// Reads an extension value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.extensions.read().get(key).cloned()
    }

    /// Writes an extension value, returning the previous one if present.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.extensions.write().insert(key.into(), value)
    }

    /// Regex capture groups written by the matching pattern constraint,
    /// under the reserved [`MATCHES_KEY`].
    pub fn matches(&self) -> Option<Vec<String>> {
        let value = self.get(MATCHES_KEY)?;
        serde_json::from_value(value).ok()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("team_id", &self.team_id)
            .field("user_id", &self.user_id)
            .field("has_bot_token", &self.bot_token.is_some())
            .field("retry_num", &self.retry_num)
            .finish()
    }
}
