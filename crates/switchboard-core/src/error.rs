//! Unified error types for the Switchboard core engine.
//!
//! This module provides the standardized error taxonomy used across the
//! dispatch pipeline. Transport- and runtime-level errors are defined in
//! their own crates and convert into [`Error`] where they cross into core.

use thiserror::Error;

// =============================================================================
// Core Errors
// =============================================================================

/// Errors produced while processing a single inbound event, plus the
/// setup-time failures that prevent an app from starting.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or app construction, fatal at startup.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The authorize function rejected the event's installation identity.
    ///
    /// Never retried internally; the adapter translates this into an
    /// auth-rejection response.
    #[error("authorization failed: {reason}")]
    Authorization {
        /// Reason reported by the authorize function.
        reason: String,
    },

    /// The inbound body was empty, unparseable, or otherwise rejected
    /// before dispatch.
    #[error("event processing failed: {0}")]
    EventProcessing(String),

    /// An event's acknowledgment was invoked more than once.
    ///
    /// This is a handler bug: it is logged and converted to a server
    /// error, never swallowed.
    #[error("acknowledgment already sent for this event")]
    MultipleAck,

    /// A response sender was invoked without a resolvable channel.
    #[error("no channel to post to: set `channel` on the message or handle an event bound to a conversation")]
    MissingChannel,

    /// An outbound platform API call failed.
    #[error("api call `{method}` failed: {reason}")]
    Api {
        /// The API method that failed (e.g. `chat.postMessage`).
        method: String,
        /// Failure reason: transport error or the platform's `error` field.
        reason: String,
    },

    /// One or more listener chains failed for the same event.
    ///
    /// Each failing chain contributes one error; sibling chains are never
    /// aborted by another chain's failure.
    #[error("{} listener(s) failed while processing the event", .0.len())]
    Aggregate(Vec<Error>),

    /// Anything that does not fit the taxonomy, with the original
    /// retained for diagnostics.
    #[error("unexpected error: {0}")]
    Unknown(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Creates an authorization error.
    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Creates an event-processing error.
    pub fn event_processing(reason: impl Into<String>) -> Self {
        Self::EventProcessing(reason.into())
    }

    /// Creates an API-call error.
    pub fn api(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Api {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Merges per-chain errors into a single aggregate.
    ///
    /// Returns `Ok(())` when the list is empty; otherwise an
    /// [`Error::Aggregate`] carrying one entry per failing chain. A
    /// single failure still aggregates, so callers can always count the
    /// failures.
    pub fn aggregate(errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }

    /// Returns the individual failures carried by this error.
    ///
    /// An aggregate yields its parts; any other error yields itself.
    pub fn failures(&self) -> &[Error] {
        match self {
            Error::Aggregate(errors) => errors,
            _ => std::slice::from_ref(self),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::EventProcessing(err.to_string())
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_none_is_ok() {
        assert!(Error::aggregate(Vec::new()).is_ok());
    }

    #[test]
    fn aggregate_of_one_still_counts() {
        let err = Error::aggregate(vec![Error::MultipleAck]).unwrap_err();
        match &err {
            Error::Aggregate(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn aggregate_of_many_counts() {
        let err = Error::aggregate(vec![
            Error::MultipleAck,
            Error::event_processing("empty body"),
        ])
        .unwrap_err();
        assert_eq!(err.failures().len(), 2);
        assert_eq!(err.to_string(), "2 listener(s) failed while processing the event");
    }
}
