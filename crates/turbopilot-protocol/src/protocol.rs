//! Wire messages exchanged with the agent process
//!
//! All messages are newline-delimited JSON (NDJSON), internally tagged by
//! `type`. [`ClientMessage`] flows from the client to the agent,
//! [`AgentMessage`] flows back.

use crate::error::Result;
use crate::permissions::{PermissionDecision, PermissionRequest};
use crate::session::SessionSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identifier correlating a control request with its reply
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from raw string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque session identity assigned by the agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an agent-assigned id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages sent from the client to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Open a session
    #[serde(rename = "session.create", rename_all = "camelCase")]
    CreateSession {
        /// Correlates the `session.created` reply
        request_id: RequestId,
        /// Session configuration
        config: SessionSpec,
    },

    /// Submit a prompt to a session
    #[serde(rename = "session.send", rename_all = "camelCase")]
    Send {
        /// Target session
        session_id: SessionId,
        /// Prompt text
        prompt: String,
    },

    /// Tear a session down
    #[serde(rename = "session.destroy", rename_all = "camelCase")]
    DestroySession {
        /// Target session
        session_id: SessionId,
    },

    /// Answer a `permission.request`
    #[serde(rename = "permission.response", rename_all = "camelCase")]
    PermissionResponse {
        /// Session the request came from
        session_id: SessionId,
        /// Request being answered
        request_id: RequestId,
        /// The decision
        decision: PermissionDecision,
    },

    /// The client is going away
    #[serde(rename = "client.shutdown")]
    Shutdown,
}

/// Messages sent from the agent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentMessage {
    /// Reply to `session.create`
    #[serde(rename = "session.created", rename_all = "camelCase")]
    SessionCreated {
        /// Request being answered
        request_id: RequestId,
        /// Identity of the new session
        session_id: SessionId,
    },

    /// A control request could not be served
    #[serde(rename = "request.failed", rename_all = "camelCase")]
    RequestFailed {
        /// Request being answered
        request_id: RequestId,
        /// Failure description
        message: String,
    },

    /// A session event; decoded later by the owning session
    #[serde(rename = "session.event", rename_all = "camelCase")]
    Event {
        /// Emitting session
        session_id: SessionId,
        /// Raw event (see [`crate::SessionEvent::from_value`])
        event: Value,
    },

    /// The agent asks for authorization to run a tool
    #[serde(rename = "permission.request", rename_all = "camelCase")]
    PermissionRequest {
        /// Emitting session
        session_id: SessionId,
        /// Correlates the `permission.response`
        request_id: RequestId,
        /// What is being asked
        request: PermissionRequest,
    },
}

impl AgentMessage {
    /// Session the message is addressed to, if any
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            AgentMessage::Event { session_id, .. }
            | AgentMessage::PermissionRequest { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// Serialize a message as a JSON value ready for the transport
pub fn to_value<T: Serialize>(message: &T) -> Result<Value> {
    Ok(serde_json::to_value(message)?)
}

/// Decode a message from a JSON value received from the transport
pub fn from_value<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
