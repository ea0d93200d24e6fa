//! Inbound event model and classification for the Switchboard engine.
//!
//! Every transport adapter converts its native request into one [`RawEvent`]:
//! opaque body bytes, a lowercase header map, and the single-use
//! acknowledgment handle. The dispatcher then classifies the parsed body
//! into an [`EventKind`] by running a fixed, ordered sequence of structural
//! probes, producing a [`Classification`] that also carries the conversation
//! the payload pertains to.
//!
//! # Probe Order
//!
//! The probe sequence is a literal, tested order: ambiguous payloads (a
//! body carrying both an `actions` array and a recognized `type` literal,
//! say) must resolve the same way on every transport:
//!
//! 1. `event` field          → [`EventKind::Event`]
//! 2. `command` field        → [`EventKind::Command`]
//! 3. `actions` array        → [`EventKind::Action`]
//! 4. recognized `type`      → [`EventKind::Options`] / [`EventKind::Shortcut`] / [`EventKind::Action`]
//! 5. `view` field           → [`EventKind::View`]
//!
//! A body matching no probe is not an error: classification returns `None`,
//! the dispatcher logs it and invokes zero listeners.

use std::collections::HashMap;

use serde_json::Value;

use crate::ack::AckHandle;

/// Canonical header carrying the platform's delivery retry count.
pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
/// Canonical header carrying the platform's delivery retry reason.
pub const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";

// =============================================================================
// Raw Event
// =============================================================================

/// A transport-agnostic inbound notification.
///
/// Adapters build exactly one `RawEvent` per delivery unit (HTTP request,
/// socket frame, proxy invocation) and hand it to the dispatcher. Header
/// keys are lowercased by the adapter.
pub struct RawEvent {
    /// The request body, decoded to canonical JSON bytes by the adapter
    /// (base64 and form encodings are the adapter's concern).
    pub body: Vec<u8>,
    /// Lowercased transport headers.
    pub headers: HashMap<String, String>,
    /// The single-use acknowledgment for this delivery.
    pub ack: AckHandle,
}

impl RawEvent {
    /// Creates a raw event from body bytes, headers, and an ack handle.
    pub fn new(body: Vec<u8>, headers: HashMap<String, String>, ack: AckHandle) -> Self {
        Self { body, headers, ack }
    }

    /// Returns the delivery retry count, if the transport reported one.
    pub fn retry_num(&self) -> Option<u32> {
        self.headers.get(RETRY_NUM_HEADER)?.parse().ok()
    }

    /// Returns the delivery retry reason, if the transport reported one.
    pub fn retry_reason(&self) -> Option<&str> {
        self.headers.get(RETRY_REASON_HEADER).map(String::as_str)
    }
}

impl std::fmt::Debug for RawEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawEvent")
            .field("body_len", &self.body.len())
            .field("headers", &self.headers.len())
            .finish()
    }
}

// =============================================================================
// Event Kind
// =============================================================================

/// Closed classification of inbound payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Events API payloads (messages, reactions, member changes, ...).
    Event,
    /// Interactive component payloads (block actions, dialog submissions,
    /// legacy interactive messages, workflow step edits).
    Action,
    /// Slash command invocations.
    Command,
    /// Global and message shortcuts.
    Shortcut,
    /// Modal view submissions and closures.
    View,
    /// Select-menu option load requests.
    Options,
}

impl EventKind {
    /// Human-readable kind name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Event => "event",
            EventKind::Action => "action",
            EventKind::Command => "command",
            EventKind::Shortcut => "shortcut",
            EventKind::View => "view",
            EventKind::Options => "options",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Classification
// =============================================================================

/// The outcome of classifying one parsed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The payload shape.
    pub kind: EventKind,
    /// The conversation the payload pertains to, when one is present.
    /// Used for default response addressing.
    pub conversation_id: Option<String>,
}

/// A structural probe: inspects the parsed body and claims a kind, or
/// passes.
type Probe = fn(&Value) -> Option<EventKind>;

/// The fixed probe sequence. Order is load-bearing and covered by tests;
/// do not reorder.
const PROBES: &[(&str, Probe)] = &[
    ("event", probe_event),
    ("command", probe_command),
    ("actions", probe_actions),
    ("type", probe_type_literal),
    ("view", probe_view),
];

fn probe_event(body: &Value) -> Option<EventKind> {
    body.get("event").map(|_| EventKind::Event)
}

fn probe_command(body: &Value) -> Option<EventKind> {
    body.get("command").map(|_| EventKind::Command)
}

fn probe_actions(body: &Value) -> Option<EventKind> {
    match body.get("actions") {
        Some(Value::Array(_)) => Some(EventKind::Action),
        _ => None,
    }
}

fn probe_type_literal(body: &Value) -> Option<EventKind> {
    match body.get("type")?.as_str()? {
        "block_suggestion" | "dialog_suggestion" => Some(EventKind::Options),
        "shortcut" | "message_action" => Some(EventKind::Shortcut),
        "dialog_submission" | "interactive_message" | "workflow_step_edit" => {
            Some(EventKind::Action)
        }
        _ => None,
    }
}

fn probe_view(body: &Value) -> Option<EventKind> {
    body.get("view").map(|_| EventKind::View)
}

/// Classifies a parsed body into a [`Classification`].
///
/// Returns `None` for bodies that match no probe; the caller logs and
/// performs no further work.
pub fn classify(body: &Value) -> Option<Classification> {
    for (name, probe) in PROBES {
        if let Some(kind) = probe(body) {
            tracing::trace!(probe = name, kind = %kind, "Classification probe matched");
            return Some(Classification {
                kind,
                conversation_id: extract_conversation(kind, body),
            });
        }
    }
    None
}

// =============================================================================
// Conversation Identity
// =============================================================================

/// Extracts the conversation id from a container, honoring the field
/// specificity order: a direct `channel` string, then a `channel` object's
/// id, then `channel_id`, then the nested `item.channel`. A more direct
/// field always wins when several are present.
fn channel_of(container: &Value) -> Option<String> {
    if let Some(channel) = container.get("channel") {
        if let Some(id) = channel.as_str() {
            return Some(id.to_string());
        }
        if let Some(id) = channel.get("id").and_then(Value::as_str) {
            return Some(id.to_string());
        }
    }
    if let Some(id) = container.get("channel_id").and_then(Value::as_str) {
        return Some(id.to_string());
    }
    if let Some(item) = container.get("item") {
        if let Some(id) = item.get("channel").and_then(Value::as_str) {
            return Some(id.to_string());
        }
        if let Some(id) = item
            .get("channel")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
        {
            return Some(id.to_string());
        }
    }
    None
}

/// Extracts the conversation identity for a classified body.
///
/// Event payloads carry the conversation inside the inner `event` object;
/// every other kind carries it at the top level of the payload.
fn extract_conversation(kind: EventKind, body: &Value) -> Option<String> {
    match kind {
        EventKind::Event => body.get("event").and_then(channel_of),
        _ => channel_of(body),
    }
}

// =============================================================================
// Payload Predicates
// =============================================================================

/// Returns the inner event type of an Events API payload (`event.type`).
pub fn inner_event_type(body: &Value) -> Option<&str> {
    body.get("event")?.get("type")?.as_str()
}

/// Returns the inner event subtype of an Events API payload, if any.
pub fn inner_event_subtype(body: &Value) -> Option<&str> {
    body.get("event")?.get("subtype")?.as_str()
}

/// Returns the message text of an Events API message payload.
pub fn message_text(body: &Value) -> Option<&str> {
    body.get("event")?.get("text")?.as_str()
}

/// Whether the payload marks an enterprise-wide installation.
///
/// The platform serializes this flag inconsistently: some payload shapes
/// carry a boolean, others the literal string `"true"`.
pub fn is_enterprise_install(value: &Value) -> bool {
    match value.get("is_enterprise_install") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// Event subtypes that must bypass authorization: once the app is being
/// uninstalled or its tokens revoked, no installation context is
/// resolvable for the workspace anymore.
const AUTHORIZE_BYPASS_EVENTS: &[&str] = &["app_uninstalled", "tokens_revoked"];

/// Whether this payload's event type must skip the authorize function.
pub fn bypasses_authorize(body: &Value) -> bool {
    inner_event_type(body).is_some_and(|t| AUTHORIZE_BYPASS_EVENTS.contains(&t))
}
