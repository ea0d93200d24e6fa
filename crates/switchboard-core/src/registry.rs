//! The append-only listener registry.
//!
//! Registration happens at setup time, before any dispatch; there is no
//! removal. Once the app starts, the registry is only read (shared behind
//! an `Arc`), so dispatch needs no locking.

use serde_json::Value;

use crate::constraint::ConstraintSet;
use crate::event::EventKind;
use crate::listener::BoxedMiddleware;

/// One registered listener: kind, constraints, and its own middleware
/// chain (the listener itself is the chain's terminal link).
pub struct ListenerEntry {
    pub kind: EventKind,
    pub constraints: ConstraintSet,
    pub chain: Vec<BoxedMiddleware>,
}

/// A matched entry plus the capture groups its constraints produced.
pub struct Selection<'a> {
    pub entry: &'a ListenerEntry,
    pub captures: Vec<String>,
}

/// Holds global middleware and listener entries in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    global: Vec<BoxedMiddleware>,
    entries: Vec<ListenerEntry>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a global middleware; it runs ahead of every matched
    /// listener chain, in registration order.
    pub fn add_global(&mut self, middleware: BoxedMiddleware) {
        self.global.push(middleware);
    }

    /// Appends a listener entry.
    pub fn add_entry(
        &mut self,
        kind: EventKind,
        constraints: ConstraintSet,
        chain: Vec<BoxedMiddleware>,
    ) {
        self.entries.push(ListenerEntry {
            kind,
            constraints,
            chain,
        });
    }

    /// The registered global middleware, in order.
    pub fn global(&self) -> &[BoxedMiddleware] {
        &self.global
    }

    /// Number of listener entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Selects every entry whose kind equals the classified kind and whose
    /// constraints match, in registration order. Dispatch fans out to all
    /// of them, not just the first.
    pub fn select(&self, kind: EventKind, body: &Value) -> Vec<Selection<'_>> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .filter_map(|entry| {
                entry
                    .constraints
                    .matches(kind, body)
                    .map(|captures| Selection { entry, captures })
            })
            .collect()
    }

    /// Builds the full chain for one matched entry: global middleware
    /// first, then the entry's own chain.
    pub fn chain_for(&self, entry: &ListenerEntry) -> Vec<BoxedMiddleware> {
        let mut chain = Vec::with_capacity(self.global.len() + entry.chain.len());
        chain.extend(self.global.iter().cloned());
        chain.extend(entry.chain.iter().cloned());
        chain
    }

    /// The chain used when no entry matched: global middleware only, so
    /// app-wide middleware still observes the event.
    pub fn empty_chain(&self) -> Vec<BoxedMiddleware> {
        self.global.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::listener_fn;
    use regex::Regex;
    use serde_json::json;

    fn noop() -> BoxedMiddleware {
        listener_fn(|_args| async { Ok(()) })
    }

    #[test]
    fn selection_filters_by_kind_and_constraints() {
        let mut registry = ListenerRegistry::new();
        registry.add_entry(
            EventKind::Event,
            ConstraintSet::new().event_type("app_mention"),
            vec![noop()],
        );
        registry.add_entry(EventKind::Command, ConstraintSet::new(), vec![noop()]);
        registry.add_entry(EventKind::Event, ConstraintSet::new(), vec![noop()]);

        let body = json!({"event": {"type": "app_mention"}});
        let selected = registry.select(EventKind::Event, &body);
        assert_eq!(selected.len(), 2);

        let body = json!({"event": {"type": "reaction_added"}});
        let selected = registry.select(EventKind::Event, &body);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn disjoint_text_patterns_select_one_entry() {
        let mut registry = ListenerRegistry::new();
        registry.add_entry(
            EventKind::Event,
            ConstraintSet::new()
                .event_type("message")
                .text(Regex::new("hello").unwrap()),
            vec![noop()],
        );
        registry.add_entry(
            EventKind::Event,
            ConstraintSet::new()
                .event_type("message")
                .text(Regex::new("goodbye").unwrap()),
            vec![noop()],
        );

        let body = json!({"event": {"type": "message", "text": "hello"}});
        assert_eq!(registry.select(EventKind::Event, &body).len(), 1);
    }

    #[test]
    fn chain_for_prepends_global_middleware() {
        let mut registry = ListenerRegistry::new();
        registry.add_global(noop());
        registry.add_global(noop());
        registry.add_entry(EventKind::Event, ConstraintSet::new(), vec![noop()]);

        let body = json!({"event": {"type": "message"}});
        let selected = registry.select(EventKind::Event, &body);
        let chain = registry.chain_for(selected[0].entry);
        assert_eq!(chain.len(), 3);
        assert_eq!(registry.empty_chain().len(), 2);
    }
}
