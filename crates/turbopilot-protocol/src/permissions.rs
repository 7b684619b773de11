//! Permission request and decision types
//!
//! When the agent needs authorization for a tool invocation it sends a
//! [`PermissionRequest`]; the client answers with a [`PermissionDecision`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category of capability the agent wants to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    /// Tool provided by an MCP tool server
    Mcp,
    /// Shell command execution
    Shell,
    /// File write
    Write,
    /// File read
    Read,
    /// URL fetch
    Url,
    /// Anything the client does not recognise
    #[serde(other)]
    Other,
}

/// Authorization request for a single tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Capability category
    pub kind: PermissionKind,

    /// Tool the agent wants to run
    pub tool_name: String,

    /// Tool call the request is attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Anything else the agent reports (arguments, server name, paths...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl PermissionRequest {
    /// Create a request for a tool
    pub fn new(kind: PermissionKind, tool_name: impl Into<String>) -> Self {
        Self {
            kind,
            tool_name: tool_name.into(),
            tool_call_id: None,
            metadata: Map::new(),
        }
    }

    /// Attach the tool call id
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
#[non_exhaustive]
pub enum PermissionDecision {
    /// The tool may run
    Approved,

    /// The tool must not run
    Denied {
        /// Why the tool was refused
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl PermissionDecision {
    /// Denial with a reason
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: Some(reason.into()),
        }
    }

    /// Whether the tool may run
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Denial reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Denied { reason } => reason.as_deref(),
            _ => None,
        }
    }
}
