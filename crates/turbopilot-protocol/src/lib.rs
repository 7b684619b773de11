//! Event model and wire protocol for TurboPilot agent sessions
//!
//! This crate holds the pure data types shared by the transport and the agent
//! SDK: the closed set of session events, permission requests and decisions,
//! the session creation spec, and the NDJSON messages exchanged with the agent
//! process.
//!
//! # Type Organization
//!
//! - **Events**: [`event`] - `SessionEvent` and its payloads
//! - **Ordering**: [`ledger`] - per-tool-call lifecycle tracking
//! - **Permissions**: [`permissions`] - requests and decisions
//! - **Session spec**: [`session`] - model, tool servers, system message
//! - **Wire messages**: [`protocol`] - client/agent envelopes and ids
//! - **Errors**: [`error`] - decoding and validation failures

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod ledger;
pub mod permissions;
pub mod protocol;
pub mod session;

pub use error::{ProtocolError, Result};
pub use event::{
    AssistantMessage, EventKind, SessionEvent, SessionMessage, ToolError, ToolExecutionComplete,
    ToolExecutionPartialResult, ToolExecutionProgress, ToolExecutionStart, ToolResult,
};
pub use ledger::{DEFAULT_COMPLETED_RETENTION, OrderViolation, ToolCallLedger, ToolCallPhase};
pub use permissions::{PermissionDecision, PermissionKind, PermissionRequest};
pub use protocol::{AgentMessage, ClientMessage, RequestId, SessionId};
pub use session::{ALL_TOOLS, McpServerConfig, McpTransportKind, SessionSpec, SystemMessage};
