//! Kind-specific argument bundles handed to listeners.
//!
//! After authorization, the engine builds one [`DispatchArgs`] value per
//! event: an explicit tagged union carried by value through chain
//! construction, so handlers receive their specialized bundle directly
//! instead of fishing it back out of a generic side-channel.
//!
//! Each bundle combines the kind's payload with the applicable subset of
//! the three senders:
//!
//! - [`Say`] posts to the event's resolved conversation; present only
//!   when a bot token was authorized.
//! - [`Respond`] posts to the payload's `response_url`; present only
//!   when the payload carries one.
//! - [`AckHandle`] is the single-use acknowledgment, specialized per kind
//!   by the bundle's helper methods.

use std::sync::Arc;

use serde_json::Value;

use crate::ack::AckHandle;
use crate::client::{ApiClient, ApiTransport};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::EventKind;

// =============================================================================
// Senders
// =============================================================================

/// Sends messages to the event's conversation.
#[derive(Clone)]
pub struct Say {
    client: Arc<ApiClient>,
    context: Arc<Context>,
}

impl Say {
    pub(crate) fn new(client: Arc<ApiClient>, context: Arc<Context>) -> Self {
        Self { client, context }
    }

    /// Posts a message.
    ///
    /// Channel resolution precedence: an explicit `channel` on the message
    /// wins, then the conversation recorded on the context. With neither,
    /// this fails with [`Error::MissingChannel`]; it never drops the
    /// message silently.
    pub async fn say(&self, message: impl Into<Value>) -> Result<Value> {
        let message = message.into();
        let channel = message
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.context.conversation_id())
            .ok_or(Error::MissingChannel)?;
        self.client.chat_post_message(&channel, message).await
    }
}

/// Sends messages to the payload's `response_url`.
#[derive(Clone)]
pub struct Respond {
    transport: Arc<dyn ApiTransport>,
    url: String,
}

impl Respond {
    pub(crate) fn new(transport: Arc<dyn ApiTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    /// Posts to the response URL. A bare string becomes `{"text": ...}`.
    pub async fn respond(&self, message: impl Into<Value>) -> Result<()> {
        let body = match message.into() {
            Value::String(text) => serde_json::json!({ "text": text }),
            other => other,
        };
        self.transport.post_json(&self.url, None, body).await?;
        Ok(())
    }

    /// The destination URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

// =============================================================================
// Per-Kind Bundles
// =============================================================================

/// Arguments for Events API listeners.
#[derive(Clone)]
pub struct EventArgs {
    /// The inner `event` object.
    pub event: Arc<Value>,
    /// Conversation sender, when a bot token resolved.
    pub say: Option<Say>,
    /// The single-use acknowledgment.
    pub ack: AckHandle,
}

/// Arguments for interactive-component listeners.
#[derive(Clone)]
pub struct ActionArgs {
    /// The triggering action (first element of the `actions` array), or
    /// the whole payload for legacy shapes without one.
    pub action: Arc<Value>,
    /// The full interactive payload.
    pub payload: Arc<Value>,
    pub say: Option<Say>,
    pub respond: Option<Respond>,
    pub ack: AckHandle,
}

/// Arguments for slash-command listeners.
#[derive(Clone)]
pub struct CommandArgs {
    /// The command payload (flat form fields).
    pub command: Arc<Value>,
    pub say: Option<Say>,
    pub respond: Option<Respond>,
    pub ack: AckHandle,
}

impl CommandArgs {
    /// Acknowledges with a visible message (string or message object).
    pub async fn ack_with(&self, message: impl Into<Value>) -> Result<()> {
        let body = match message.into() {
            Value::String(text) => serde_json::json!({ "text": text }),
            other => other,
        };
        self.ack.ack(Some(body)).await
    }
}

/// Arguments for shortcut listeners.
#[derive(Clone)]
pub struct ShortcutArgs {
    /// The shortcut payload.
    pub shortcut: Arc<Value>,
    pub say: Option<Say>,
    pub respond: Option<Respond>,
    pub ack: AckHandle,
}

/// Arguments for view submission/closure listeners.
#[derive(Clone)]
pub struct ViewArgs {
    /// The `view` object.
    pub view: Arc<Value>,
    /// The full payload.
    pub payload: Arc<Value>,
    pub ack: AckHandle,
}

impl ViewArgs {
    /// Acknowledges with a response action (`errors`, `update`, `push`).
    pub async fn ack_with(&self, response_action: Value) -> Result<()> {
        self.ack.ack(Some(response_action)).await
    }
}

/// Arguments for select-menu options listeners.
#[derive(Clone)]
pub struct OptionsArgs {
    /// The options-request payload.
    pub payload: Arc<Value>,
    pub ack: AckHandle,
}

impl OptionsArgs {
    /// Acknowledges with the option list to display.
    pub async fn ack_with(&self, options: Value) -> Result<()> {
        self.ack.ack(Some(options)).await
    }
}

// =============================================================================
// Dispatch Args
// =============================================================================

/// The tagged union of per-kind bundles, built once per event.
#[derive(Clone)]
pub enum DispatchArgs {
    Event(EventArgs),
    Action(ActionArgs),
    Command(CommandArgs),
    Shortcut(ShortcutArgs),
    View(ViewArgs),
    Options(OptionsArgs),
}

impl DispatchArgs {
    /// Builds the bundle for one classified event.
    pub fn build(
        kind: EventKind,
        body: &Arc<Value>,
        context: &Arc<Context>,
        client: Option<&Arc<ApiClient>>,
        transport: &Arc<dyn ApiTransport>,
        ack: AckHandle,
    ) -> Self {
        let say = client.map(|c| Say::new(Arc::clone(c), Arc::clone(context)));
        let respond = body
            .get("response_url")
            .and_then(Value::as_str)
            .map(|url| Respond::new(Arc::clone(transport), url));

        match kind {
            EventKind::Event => DispatchArgs::Event(EventArgs {
                event: Arc::new(body.get("event").cloned().unwrap_or(Value::Null)),
                say,
                ack,
            }),
            EventKind::Action => {
                let action = body
                    .get("actions")
                    .and_then(|a| a.get(0))
                    .cloned()
                    .unwrap_or_else(|| body.as_ref().clone());
                DispatchArgs::Action(ActionArgs {
                    action: Arc::new(action),
                    payload: Arc::clone(body),
                    say,
                    respond,
                    ack,
                })
            }
            EventKind::Command => DispatchArgs::Command(CommandArgs {
                command: Arc::clone(body),
                say,
                respond,
                ack,
            }),
            EventKind::Shortcut => DispatchArgs::Shortcut(ShortcutArgs {
                shortcut: Arc::clone(body),
                say,
                respond,
                ack,
            }),
            EventKind::View => DispatchArgs::View(ViewArgs {
                view: Arc::new(body.get("view").cloned().unwrap_or(Value::Null)),
                payload: Arc::clone(body),
                ack,
            }),
            EventKind::Options => DispatchArgs::Options(OptionsArgs {
                payload: Arc::clone(body),
                ack,
            }),
        }
    }

    /// The kind this bundle was built for.
    pub fn kind(&self) -> EventKind {
        match self {
            DispatchArgs::Event(_) => EventKind::Event,
            DispatchArgs::Action(_) => EventKind::Action,
            DispatchArgs::Command(_) => EventKind::Command,
            DispatchArgs::Shortcut(_) => EventKind::Shortcut,
            DispatchArgs::View(_) => EventKind::View,
            DispatchArgs::Options(_) => EventKind::Options,
        }
    }

    /// The shared acknowledgment handle.
    pub fn ack_handle(&self) -> &AckHandle {
        match self {
            DispatchArgs::Event(a) => &a.ack,
            DispatchArgs::Action(a) => &a.ack,
            DispatchArgs::Command(a) => &a.ack,
            DispatchArgs::Shortcut(a) => &a.ack,
            DispatchArgs::View(a) => &a.ack,
            DispatchArgs::Options(a) => &a.ack,
        }
    }

    /// The conversation sender, for kinds that carry one.
    pub fn say(&self) -> Option<&Say> {
        match self {
            DispatchArgs::Event(a) => a.say.as_ref(),
            DispatchArgs::Action(a) => a.say.as_ref(),
            DispatchArgs::Command(a) => a.say.as_ref(),
            DispatchArgs::Shortcut(a) => a.say.as_ref(),
            DispatchArgs::View(_) | DispatchArgs::Options(_) => None,
        }
    }

    /// The response-URL sender, for payloads that carry one.
    pub fn respond(&self) -> Option<&Respond> {
        match self {
            DispatchArgs::Action(a) => a.respond.as_ref(),
            DispatchArgs::Command(a) => a.respond.as_ref(),
            DispatchArgs::Shortcut(a) => a.respond.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authorization;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ApiTransport for RecordingTransport {
        async fn post_json(
            &self,
            url: &str,
            _token: Option<&str>,
            body: Value,
        ) -> Result<Value> {
            self.calls.lock().push((url.to_string(), body));
            Ok(json!({"ok": true}))
        }
    }

    fn context(conversation: Option<&str>) -> Arc<Context> {
        Arc::new(Context::new(
            Authorization {
                bot_token: Some("xoxb-1".into()),
                ..Authorization::default()
            },
            conversation.map(str::to_string),
            None,
            None,
        ))
    }

    fn build(
        kind: EventKind,
        body: Value,
        conversation: Option<&str>,
    ) -> (DispatchArgs, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let dyn_transport: Arc<dyn ApiTransport> = transport.clone();
        let client = Arc::new(ApiClient::new(Arc::clone(&dyn_transport), "xoxb-1"));
        let args = DispatchArgs::build(
            kind,
            &Arc::new(body),
            &context(conversation),
            Some(&client),
            &dyn_transport,
            AckHandle::noop(),
        );
        (args, transport)
    }

    #[tokio::test]
    async fn say_uses_context_conversation() {
        let (args, transport) = build(
            EventKind::Event,
            json!({"event": {"type": "app_mention"}}),
            Some("C1"),
        );
        args.say().unwrap().say(json!("hello")).await.unwrap();

        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["channel"], json!("C1"));
        assert_eq!(calls[0].1["text"], json!("hello"));
    }

    #[tokio::test]
    async fn explicit_channel_beats_context() {
        let (args, transport) = build(
            EventKind::Event,
            json!({"event": {"type": "app_mention"}}),
            Some("C1"),
        );
        args.say()
            .unwrap()
            .say(json!({"text": "hi", "channel": "C2"}))
            .await
            .unwrap();
        assert_eq!(transport.calls.lock()[0].1["channel"], json!("C2"));
    }

    #[tokio::test]
    async fn say_without_channel_fails_loudly() {
        let (args, transport) = build(
            EventKind::Event,
            json!({"event": {"type": "app_uninstalled"}}),
            None,
        );
        let err = args.say().unwrap().say(json!("hi")).await.unwrap_err();
        assert!(matches!(err, Error::MissingChannel));
        assert!(transport.calls.lock().is_empty());
    }

    #[test]
    fn respond_requires_response_url() {
        let (args, _) = build(EventKind::Command, json!({"command": "/x"}), None);
        assert!(args.respond().is_none());

        let (args, _) = build(
            EventKind::Command,
            json!({"command": "/x", "response_url": "https://hooks.example/123"}),
            None,
        );
        assert_eq!(args.respond().unwrap().url(), "https://hooks.example/123");
    }

    #[test]
    fn action_bundle_extracts_first_action() {
        let (args, _) = build(
            EventKind::Action,
            json!({"type": "block_actions", "actions": [{"action_id": "go"}, {"action_id": "no"}]}),
            None,
        );
        match args {
            DispatchArgs::Action(a) => {
                assert_eq!(a.action["action_id"], json!("go"));
            }
            _ => panic!("expected action bundle"),
        }
    }

    #[tokio::test]
    async fn command_ack_with_wraps_text() {
        let (args, _) = build(EventKind::Command, json!({"command": "/x"}), None);
        match args {
            DispatchArgs::Command(c) => {
                c.ack_with(json!("on it")).await.unwrap();
                assert!(c.ack.is_acked());
            }
            _ => panic!("expected command bundle"),
        }
    }
}
