//! Declarative listener constraints.
//!
//! A [`ConstraintSet`] narrows which payloads a listener accepts. Every
//! field is optional; a field that is set must be satisfied, and an empty
//! set matches every event of the listener's kind. Each field holds one
//! [`StringMatcher`]: an exact string is checked by equality, a compiled
//! pattern by regex containment, so "exact instead of pattern" holds by
//! construction.
//!
//! Pattern matches surface their capture groups: the dispatcher writes
//! them into the context's extension bag under the reserved
//! [`MATCHES_KEY`](crate::context::MATCHES_KEY).

use regex::Regex;
use serde_json::Value;

use crate::event::{self, EventKind};

// =============================================================================
// String Matcher
// =============================================================================

/// An exact-string or compiled-pattern matcher for one constraint field.
#[derive(Debug, Clone)]
pub enum StringMatcher {
    /// Exact equality.
    Exact(String),
    /// Regex containment; capture groups are surfaced on match.
    Pattern(Regex),
}

impl StringMatcher {
    /// Tests a candidate value.
    ///
    /// Returns `None` on mismatch. On match, returns the capture groups
    /// for a pattern (full match first, then groups), or an empty list
    /// for an exact match.
    pub fn matches(&self, candidate: &str) -> Option<Vec<String>> {
        match self {
            StringMatcher::Exact(expected) => (expected == candidate).then(Vec::new),
            StringMatcher::Pattern(re) => re.captures(candidate).map(|caps| {
                caps.iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            }),
        }
    }
}

impl From<&str> for StringMatcher {
    fn from(s: &str) -> Self {
        StringMatcher::Exact(s.to_string())
    }
}

impl From<String> for StringMatcher {
    fn from(s: String) -> Self {
        StringMatcher::Exact(s)
    }
}

impl From<Regex> for StringMatcher {
    fn from(re: Regex) -> Self {
        StringMatcher::Pattern(re)
    }
}

// =============================================================================
// Constraint Set
// =============================================================================

/// The per-field constraints of one listener entry.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    /// Payload `type` literal (narrows shortcut/view/action shapes).
    pub payload_type: Option<StringMatcher>,
    /// Inner event type (`event.type`) for Events API listeners.
    pub event_type: Option<StringMatcher>,
    /// Inner event subtype (`event.subtype`).
    pub event_subtype: Option<StringMatcher>,
    /// `action_id` of the triggering action.
    pub action_id: Option<StringMatcher>,
    /// `block_id` of the triggering action's block.
    pub block_id: Option<StringMatcher>,
    /// `callback_id` (shortcuts, views, legacy interactive shapes).
    pub callback_id: Option<StringMatcher>,
    /// Slash command name, normalized to a leading `/`.
    pub command: Option<StringMatcher>,
    /// Message text, for message listeners.
    pub text: Option<StringMatcher>,
}

/// Legacy interactive shapes whose callback id may live anywhere in the
/// payload rather than on the structured action.
const LEGACY_CALLBACK_TYPES: &[&str] = &["interactive_message", "dialog_submission"];

impl ConstraintSet {
    /// An empty set: matches every event of the listener's kind.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload_type(mut self, m: impl Into<StringMatcher>) -> Self {
        self.payload_type = Some(m.into());
        self
    }

    pub fn event_type(mut self, m: impl Into<StringMatcher>) -> Self {
        self.event_type = Some(m.into());
        self
    }

    pub fn event_subtype(mut self, m: impl Into<StringMatcher>) -> Self {
        self.event_subtype = Some(m.into());
        self
    }

    pub fn action_id(mut self, m: impl Into<StringMatcher>) -> Self {
        self.action_id = Some(m.into());
        self
    }

    pub fn block_id(mut self, m: impl Into<StringMatcher>) -> Self {
        self.block_id = Some(m.into());
        self
    }

    pub fn callback_id(mut self, m: impl Into<StringMatcher>) -> Self {
        self.callback_id = Some(m.into());
        self
    }

    /// Sets the command constraint; a missing leading `/` is prepended so
    /// `command("deploy")` and `command("/deploy")` are equivalent.
    pub fn command(mut self, m: impl Into<StringMatcher>) -> Self {
        self.command = Some(match m.into() {
            StringMatcher::Exact(name) if !name.starts_with('/') => {
                StringMatcher::Exact(format!("/{name}"))
            }
            other => other,
        });
        self
    }

    pub fn text(mut self, m: impl Into<StringMatcher>) -> Self {
        self.text = Some(m.into());
        self
    }

    /// Evaluates this set against a classified payload.
    ///
    /// Returns `None` on any field mismatch. On match, returns the capture
    /// groups of the last pattern field that produced any (message-text
    /// patterns therefore win), or an empty list.
    pub fn matches(&self, kind: EventKind, body: &Value) -> Option<Vec<String>> {
        let mut captures = Vec::new();

        let mut check = |matcher: &Option<StringMatcher>, value: Option<&str>| -> bool {
            let Some(matcher) = matcher else { return true };
            let Some(value) = value else { return false };
            match matcher.matches(value) {
                Some(caps) => {
                    if !caps.is_empty() {
                        captures = caps;
                    }
                    true
                }
                None => false,
            }
        };

        let ok = check(&self.payload_type, body.get("type").and_then(Value::as_str))
            && check(&self.event_type, event::inner_event_type(body))
            && check(&self.event_subtype, event::inner_event_subtype(body))
            && check(&self.action_id, first_action_field(body, "action_id").as_deref())
            && check(&self.block_id, first_action_field(body, "block_id").as_deref())
            && check(&self.callback_id, callback_id_of(body).as_deref())
            && check(&self.command, body.get("command").and_then(Value::as_str))
            && check(&self.text, text_of(kind, body));

        ok.then_some(captures)
    }
}

/// Reads a field from the triggering action, falling back to the payload
/// top level for legacy shapes without an `actions` array.
fn first_action_field(body: &Value, key: &str) -> Option<String> {
    let from_action = body
        .get("actions")
        .and_then(|a| a.get(0))
        .and_then(|a| a.get(key))
        .and_then(Value::as_str);
    from_action
        .or_else(|| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Resolves the payload's callback id.
///
/// Structured locations first (top level, then the view). Legacy
/// interactive shapes may carry it elsewhere, so for those (and only
/// those) the whole payload is scanned as a fallback.
fn callback_id_of(body: &Value) -> Option<String> {
    if let Some(id) = body.get("callback_id").and_then(Value::as_str) {
        return Some(id.to_string());
    }
    if let Some(id) = body
        .get("view")
        .and_then(|v| v.get("callback_id"))
        .and_then(Value::as_str)
    {
        return Some(id.to_string());
    }

    let payload_type = body.get("type").and_then(Value::as_str).unwrap_or("");
    if LEGACY_CALLBACK_TYPES.contains(&payload_type) {
        return scan_for_key(body, "callback_id");
    }
    None
}

/// Depth-first search for the first string value under `key`.
fn scan_for_key(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key).and_then(Value::as_str) {
                return Some(found.to_string());
            }
            map.values().find_map(|v| scan_for_key(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| scan_for_key(v, key)),
        _ => None,
    }
}

/// The text a `text` constraint is matched against: message text for
/// Events API payloads, nothing for other kinds.
fn text_of(kind: EventKind, body: &Value) -> Option<&str> {
    match kind {
        EventKind::Event => event::message_text(body),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_set_matches_everything() {
        let set = ConstraintSet::new();
        let body = json!({"event": {"type": "anything_at_all"}});
        assert_eq!(set.matches(EventKind::Event, &body), Some(vec![]));
    }

    #[test]
    fn exact_is_equality_not_containment() {
        let set = ConstraintSet::new().event_type("message");
        assert!(
            set.matches(EventKind::Event, &json!({"event": {"type": "message"}}))
                .is_some()
        );
        // "message_changed" contains "message" but is not equal to it.
        assert!(
            set.matches(EventKind::Event, &json!({"event": {"type": "message_changed"}}))
                .is_none()
        );
    }

    #[test]
    fn pattern_is_containment_with_captures() {
        let set = ConstraintSet::new()
            .event_type("message")
            .text(Regex::new(r"deploy (\w+)").unwrap());
        let body = json!({"event": {"type": "message", "text": "please deploy prod now"}});
        let captures = set.matches(EventKind::Event, &body).unwrap();
        assert_eq!(captures, vec!["deploy prod".to_string(), "prod".to_string()]);
    }

    #[test]
    fn set_field_missing_from_payload_is_a_mismatch() {
        let set = ConstraintSet::new().action_id("approve");
        assert!(set.matches(EventKind::Action, &json!({"type": "block_actions"})).is_none());
    }

    #[test]
    fn action_id_and_block_id_read_the_first_action() {
        let set = ConstraintSet::new().action_id("approve").block_id("review");
        let body = json!({
            "type": "block_actions",
            "actions": [{"action_id": "approve", "block_id": "review"}]
        });
        assert!(set.matches(EventKind::Action, &body).is_some());
    }

    #[test]
    fn command_constraint_normalizes_slash() {
        let set = ConstraintSet::new().command("deploy");
        assert!(set.matches(EventKind::Command, &json!({"command": "/deploy"})).is_some());
        assert!(set.matches(EventKind::Command, &json!({"command": "/destroy"})).is_none());
    }

    #[test]
    fn callback_id_reads_view_for_view_payloads() {
        let set = ConstraintSet::new().callback_id("ticket_modal");
        let body = json!({"type": "view_submission", "view": {"callback_id": "ticket_modal"}});
        assert!(set.matches(EventKind::View, &body).is_some());
    }

    #[test]
    fn legacy_payload_falls_back_to_scan() {
        let set = ConstraintSet::new().callback_id("legacy_menu");
        let body = json!({
            "type": "interactive_message",
            "original_message": {"attachments": [{"callback_id": "legacy_menu"}]}
        });
        assert!(set.matches(EventKind::Action, &body).is_some());

        // Modern shapes never scan.
        let body = json!({
            "type": "block_actions",
            "actions": [{"action_id": "x"}],
            "message": {"metadata": {"callback_id": "legacy_menu"}}
        });
        assert!(set.matches(EventKind::Action, &body).is_none());
    }
}
