//! Error types for protocol operations
//!
//! Covers decoding failures of inbound agent messages and validation of
//! session specifications before they are sent to the agent.

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Event payload whose kind is not part of the event model
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    /// Event payload of a known kind that does not match its schema
    #[error("Malformed {kind} event: {reason}")]
    MalformedEvent {
        /// Wire name of the event kind
        kind: String,
        /// Decoder message
        reason: String,
    },

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid session specification
    #[error("Invalid session spec: {0}")]
    InvalidSpec(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
