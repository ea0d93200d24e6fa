//! Unified error types for the transport layer.

use thiserror::Error;

/// Errors that can occur in transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request signature verification failed.
    #[error("invalid request signature: {reason}")]
    Signature {
        /// Reason for rejection (missing header, stale timestamp, mismatch).
        reason: String,
    },

    /// The inbound body could not be decoded to a canonical payload.
    #[error("malformed inbound payload: {0}")]
    Payload(String),

    /// Failed to bind a listening address.
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// The address that failed to bind.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// A dispatch-engine error crossing back into the transport.
    #[error(transparent)]
    Dispatch(#[from] switchboard_core::Error),
}

impl TransportError {
    /// Creates a signature-rejection error.
    pub fn signature(reason: impl Into<String>) -> Self {
        Self::Signature {
            reason: reason.into(),
        }
    }

    /// Creates a malformed-payload error.
    pub fn payload(reason: impl Into<String>) -> Self {
        Self::Payload(reason.into())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
