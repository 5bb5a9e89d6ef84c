//! Error taxonomy for session operations
//!
//! Only caller-input errors (`InvalidAddress`, `InvalidTopic`) are returned
//! synchronously from the triggering call. Transport-level failures are
//! absorbed by the reconnect policy and surfaced through state changes and
//! callbacks, never as fatal errors.

use thiserror::Error;

/// Errors surfaced by the session controller API.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid broker address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    /// Network-level failure. Handled internally by the reconnect policy;
    /// only carried here for transports reporting a request-time fault.
    #[error("transport error: {0}")]
    Transport(String),

    /// Returned only by `wait_connected` when the deadline passes.
    #[error("timed out waiting for connection")]
    ConnectTimeout,

    /// The manager task is gone (the controller owning it was dropped).
    #[error("session closed")]
    SessionClosed,
}

impl SessionError {
    /// Create an invalid-address error.
    pub fn invalid_address<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-topic error.
    pub fn invalid_topic<T: Into<String>, R: Into<String>>(topic: T, reason: R) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
