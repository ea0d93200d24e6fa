//! Built-in middleware.

use std::sync::Arc;

use serde_json::Value;

use crate::listener::{BoxedMiddleware, middleware_fn};

/// Event types exempt from self-filtering: apps routinely need to see the
/// bot itself joining or leaving a channel. Preserved as-is; do not extend
/// without confirming platform semantics.
const SELF_FILTER_EXEMPT: &[&str] = &["member_joined_channel", "member_left_channel"];

/// Drops events produced by the app's own bot user.
///
/// Without this an app that posts a message in response to messages would
/// trigger itself in an infinite loop. A middleware that swallows an event
/// simply returns without invoking the continuation.
pub fn ignore_self() -> BoxedMiddleware {
    middleware_fn(|args, next| async move {
        let event = match args.event() {
            Some(bundle) => Arc::clone(&bundle.event),
            // Only Events API payloads carry a self-authored identity.
            None => return next.run(args).await,
        };

        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
        let from_bot_user = match (&args.context.bot_user_id, event.get("user")) {
            (Some(bot_user), Some(Value::String(user))) => bot_user == user,
            _ => false,
        };
        let from_bot_id = match (&args.context.bot_id, event.get("bot_id")) {
            (Some(bot_id), Some(Value::String(author))) => bot_id == author,
            _ => false,
        };

        if (from_bot_user || from_bot_id) && !SELF_FILTER_EXEMPT.contains(&event_type) {
            tracing::debug!(event_type, "Ignoring event authored by this app");
            return Ok(());
        }

        next.run(args).await
    })
}
