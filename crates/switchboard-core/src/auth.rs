//! Authorization: resolving an inbound event to an installed-workspace
//! identity.
//!
//! The engine builds an [`AuthorizeSource`] from the classified payload and
//! hands it, together with the raw body, to the externally supplied
//! [`Authorizer`]. The authorizer is a collaborator interface: apps back
//! it with an installation store, a fixed single-workspace token, or
//! anything else. Its result is copied into the per-event [`Context`] and
//! never mutated afterwards.
//!
//! [`Context`]: crate::context::Context

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::{self, EventKind};

// =============================================================================
// Source Identity
// =============================================================================

/// The identity fields extracted from a payload before authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeSource {
    /// Workspace id the event originated from.
    pub team_id: Option<String>,
    /// Enterprise (org) id, for enterprise installs.
    pub enterprise_id: Option<String>,
    /// The acting user.
    pub user_id: Option<String>,
    /// The conversation the event pertains to.
    pub conversation_id: Option<String>,
    /// Whether the payload marks an enterprise-wide installation.
    pub is_enterprise_install: bool,
}

/// Reads a field that is serialized either as a plain id string or as an
/// object carrying an `id`.
fn id_of(value: &Value) -> Option<String> {
    if let Some(id) = value.as_str() {
        return Some(id.to_string());
    }
    value.get("id").and_then(Value::as_str).map(str::to_string)
}

fn str_field(container: &Value, key: &str) -> Option<String> {
    container.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Builds the source-identity record for one classified payload.
///
/// Extraction is kind-specific: Events API payloads read identity from the
/// envelope or the nested event; slash commands carry flat `*_id` fields;
/// every interactive shape carries nested `team`/`user` objects, with the
/// user object's `team_id` as a fallback for the team.
pub fn build_source(
    kind: EventKind,
    body: &Value,
    conversation_id: Option<String>,
) -> AuthorizeSource {
    let (team_id, enterprise_id, user_id) = match kind {
        EventKind::Event => {
            let inner = body.get("event");
            (
                str_field(body, "team_id")
                    .or_else(|| inner.and_then(|e| e.get("team")).and_then(id_of)),
                str_field(body, "enterprise_id")
                    .or_else(|| inner.and_then(|e| e.get("enterprise")).and_then(id_of)),
                inner.and_then(|e| e.get("user")).and_then(id_of),
            )
        }
        EventKind::Command => (
            str_field(body, "team_id"),
            str_field(body, "enterprise_id"),
            str_field(body, "user_id"),
        ),
        _ => {
            let user = body.get("user");
            (
                body.get("team")
                    .and_then(id_of)
                    .or_else(|| user.and_then(|u| str_field(u, "team_id"))),
                body.get("enterprise").and_then(id_of),
                user.and_then(id_of),
            )
        }
    };

    AuthorizeSource {
        team_id,
        enterprise_id,
        user_id,
        conversation_id,
        is_enterprise_install: event::is_enterprise_install(body),
    }
}

// =============================================================================
// Authorization Result
// =============================================================================

/// The resolved installation identity for one event.
///
/// Produced once per event, immutable, scoped to that event's context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Authorization {
    /// Bot token for outbound calls on behalf of the installation.
    pub bot_token: Option<String>,
    /// The bot's app-level id.
    pub bot_id: Option<String>,
    /// The bot's user id within the workspace.
    pub bot_user_id: Option<String>,
    /// User token, when one was authorized.
    pub user_token: Option<String>,
    /// The acting user.
    pub user_id: Option<String>,
    /// Workspace id.
    pub team_id: Option<String>,
    /// Enterprise id.
    pub enterprise_id: Option<String>,
    /// Whether the installation is enterprise-wide.
    pub is_enterprise_install: bool,
    /// Authorizer-supplied custom properties, merged into the context's
    /// extension bag.
    pub custom: HashMap<String, Value>,
}

impl Authorization {
    /// Synthesizes the minimal result used when authorization is bypassed:
    /// only the team/enterprise identity survives, no tokens.
    pub fn minimal(source: &AuthorizeSource) -> Self {
        Self {
            team_id: source.team_id.clone(),
            enterprise_id: source.enterprise_id.clone(),
            user_id: source.user_id.clone(),
            is_enterprise_install: source.is_enterprise_install,
            ..Self::default()
        }
    }
}

// =============================================================================
// Authorizer
// =============================================================================

/// Resolves a source identity to an installed-workspace identity.
///
/// Supplied by the application; failures abort processing of the event and
/// surface as [`Error::Authorization`].
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Resolves tokens and ids for the given source.
    async fn authorize(&self, source: &AuthorizeSource, body: &Value) -> Result<Authorization>;
}

/// Wraps an async closure as an [`Authorizer`].
///
/// ```ignore
/// let authorizer = authorizer_fn(|source, _body| async move {
///     lookup_installation(source.team_id.as_deref()).await
/// });
/// ```
pub fn authorizer_fn<F, Fut>(f: F) -> impl Authorizer
where
    F: Fn(AuthorizeSource, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Authorization>> + Send,
{
    struct FnAuthorizer<F>(F);

    #[async_trait]
    impl<F, Fut> Authorizer for FnAuthorizer<F>
    where
        F: Fn(AuthorizeSource, Value) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Authorization>> + Send,
    {
        async fn authorize(
            &self,
            source: &AuthorizeSource,
            body: &Value,
        ) -> Result<Authorization> {
            (self.0)(source.clone(), body.clone()).await
        }
    }

    FnAuthorizer(f)
}

/// A fixed single-workspace authorizer.
///
/// Covers the common deployment where the app is installed into exactly one
/// workspace and configured with its bot token directly; identity fields
/// come from configuration instead of a remote lookup.
#[derive(Debug, Clone)]
pub struct SingleTeam {
    bot_token: String,
    bot_id: Option<String>,
    bot_user_id: Option<String>,
    team_id: Option<String>,
}

impl SingleTeam {
    /// Creates a single-workspace authorizer from a bot token.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            bot_id: None,
            bot_user_id: None,
            team_id: None,
        }
    }

    /// Sets the bot's app-level id.
    pub fn bot_id(mut self, id: impl Into<String>) -> Self {
        self.bot_id = Some(id.into());
        self
    }

    /// Sets the bot's user id (enables the ignore-self filter).
    pub fn bot_user_id(mut self, id: impl Into<String>) -> Self {
        self.bot_user_id = Some(id.into());
        self
    }

    /// Pins the workspace id; events from any other workspace are
    /// rejected.
    pub fn team_id(mut self, id: impl Into<String>) -> Self {
        self.team_id = Some(id.into());
        self
    }
}

#[async_trait]
impl Authorizer for SingleTeam {
    async fn authorize(&self, source: &AuthorizeSource, _body: &Value) -> Result<Authorization> {
        if let (Some(expected), Some(actual)) = (&self.team_id, &source.team_id) {
            if expected != actual {
                return Err(Error::authorization(format!(
                    "event from unexpected workspace {actual}"
                )));
            }
        }
        Ok(Authorization {
            bot_token: Some(self.bot_token.clone()),
            bot_id: self.bot_id.clone(),
            bot_user_id: self.bot_user_id.clone(),
            user_id: source.user_id.clone(),
            team_id: source.team_id.clone().or_else(|| self.team_id.clone()),
            enterprise_id: source.enterprise_id.clone(),
            is_enterprise_install: source.is_enterprise_install,
            ..Authorization::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_reads_envelope_then_nested_event() {
        let body = json!({
            "team_id": "T1",
            "event": {"type": "app_mention", "user": "U1", "team": "T_INNER"}
        });
        let source = build_source(EventKind::Event, &body, Some("C1".into()));
        assert_eq!(source.team_id.as_deref(), Some("T1"));
        assert_eq!(source.user_id.as_deref(), Some("U1"));
        assert_eq!(source.conversation_id.as_deref(), Some("C1"));

        let body = json!({"event": {"type": "app_mention", "team": "T2"}});
        let source = build_source(EventKind::Event, &body, None);
        assert_eq!(source.team_id.as_deref(), Some("T2"));
    }

    #[test]
    fn command_kind_reads_flat_fields() {
        let body = json!({"command": "/deploy", "team_id": "T3", "user_id": "U3"});
        let source = build_source(EventKind::Command, &body, None);
        assert_eq!(source.team_id.as_deref(), Some("T3"));
        assert_eq!(source.user_id.as_deref(), Some("U3"));
    }

    #[test]
    fn interactive_kinds_read_nested_objects() {
        let body = json!({
            "type": "block_actions",
            "actions": [],
            "team": {"id": "T4"},
            "user": {"id": "U4"}
        });
        let source = build_source(EventKind::Action, &body, None);
        assert_eq!(source.team_id.as_deref(), Some("T4"));
        assert_eq!(source.user_id.as_deref(), Some("U4"));
    }

    #[test]
    fn interactive_team_falls_back_to_user_team_id() {
        let body = json!({
            "type": "shortcut",
            "user": {"id": "U5", "team_id": "T5"}
        });
        let source = build_source(EventKind::Shortcut, &body, None);
        assert_eq!(source.team_id.as_deref(), Some("T5"));
    }

    #[test]
    fn minimal_result_carries_identity_only() {
        let source = AuthorizeSource {
            team_id: Some("T6".into()),
            enterprise_id: Some("E6".into()),
            ..AuthorizeSource::default()
        };
        let auth = Authorization::minimal(&source);
        assert_eq!(auth.team_id.as_deref(), Some("T6"));
        assert_eq!(auth.enterprise_id.as_deref(), Some("E6"));
        assert!(auth.bot_token.is_none());
    }

    #[tokio::test]
    async fn single_team_rejects_foreign_workspace() {
        let authorizer = SingleTeam::new("xoxb-1").team_id("T1");
        let source = AuthorizeSource {
            team_id: Some("T2".into()),
            ..AuthorizeSource::default()
        };
        let err = authorizer.authorize(&source, &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Authorization { .. }));
    }

    #[tokio::test]
    async fn closure_adapter_is_an_authorizer() {
        let authorizer = authorizer_fn(|source, _body| async move {
            Ok(Authorization {
                bot_token: Some("xoxb-2".into()),
                team_id: source.team_id,
                ..Authorization::default()
            })
        });
        let source = AuthorizeSource {
            team_id: Some("T7".into()),
            ..AuthorizeSource::default()
        };
        let auth = authorizer.authorize(&source, &json!({})).await.unwrap();
        assert_eq!(auth.bot_token.as_deref(), Some("xoxb-2"));
        assert_eq!(auth.team_id.as_deref(), Some("T7"));
    }
}
