//! Session event model
//!
//! Every event an agent session can surface is one variant of [`SessionEvent`].
//! On the wire an event is adjacently tagged:
//!
//! ```json
//! {"type": "tool.execution_start", "data": {"toolName": "list_files", "toolCallId": "1", "arguments": {}}}
//! ```

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Payload shared by `session.info` and `session.error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// A tool invocation has started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionStart {
    /// Name of the tool being invoked
    pub tool_name: String,

    /// Identifier tying all events of one invocation together
    pub tool_call_id: String,

    /// Arguments passed to the tool
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Partial output streamed by a running tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionPartialResult {
    /// Invocation identifier
    pub tool_call_id: String,

    /// Output chunk
    #[serde(default)]
    pub partial_output: String,
}

/// Progress note from a running tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionProgress {
    /// Invocation identifier
    pub tool_call_id: String,

    /// Progress description
    #[serde(default)]
    pub progress_message: String,
}

/// Successful tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Rendered tool output
    #[serde(default)]
    pub content: String,
}

/// Tool failure description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    /// Failure message
    #[serde(default)]
    pub message: String,
}

/// A tool invocation finished
///
/// `result` is expected when `success` is true and `error` when it is false,
/// but the agent does not enforce this: both are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionComplete {
    /// Invocation identifier
    pub tool_call_id: String,

    /// Whether the tool succeeded
    #[serde(default)]
    pub success: bool,

    /// Output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,

    /// Failure on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolExecutionComplete {
    /// Best available text for this completion
    ///
    /// Result content first, then the error message, then `"(no content)"`.
    pub fn output(&self) -> &str {
        if let Some(result) = &self.result {
            return &result.content;
        }
        if let Some(error) = &self.error {
            return &error.message;
        }
        "(no content)"
    }

    /// Failure message, if the completion reports one
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Assistant reply text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Reply content
    #[serde(default)]
    pub content: String,
}

/// An event emitted by an agent session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// Informational notice from the session
    #[serde(rename = "session.info")]
    SessionInfo(SessionMessage),

    /// Session-level failure
    #[serde(rename = "session.error")]
    SessionError(SessionMessage),

    /// Tool invocation started
    #[serde(rename = "tool.execution_start")]
    ToolExecutionStart(ToolExecutionStart),

    /// Tool produced partial output
    #[serde(rename = "tool.execution_partial_result")]
    ToolExecutionPartialResult(ToolExecutionPartialResult),

    /// Tool reported progress
    #[serde(rename = "tool.execution_progress")]
    ToolExecutionProgress(ToolExecutionProgress),

    /// Tool invocation finished
    #[serde(rename = "tool.execution_complete")]
    ToolExecutionComplete(ToolExecutionComplete),

    /// Assistant reply
    #[serde(rename = "assistant.message")]
    AssistantMessage(AssistantMessage),
}

/// Discriminant of [`SessionEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `session.info`
    SessionInfo,
    /// `session.error`
    SessionError,
    /// `tool.execution_start`
    ToolExecutionStart,
    /// `tool.execution_partial_result`
    ToolExecutionPartialResult,
    /// `tool.execution_progress`
    ToolExecutionProgress,
    /// `tool.execution_complete`
    ToolExecutionComplete,
    /// `assistant.message`
    AssistantMessage,
}

impl EventKind {
    /// All kinds, in declaration order
    pub const ALL: [EventKind; 7] = [
        EventKind::SessionInfo,
        EventKind::SessionError,
        EventKind::ToolExecutionStart,
        EventKind::ToolExecutionPartialResult,
        EventKind::ToolExecutionProgress,
        EventKind::ToolExecutionComplete,
        EventKind::AssistantMessage,
    ];

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionInfo => "session.info",
            EventKind::SessionError => "session.error",
            EventKind::ToolExecutionStart => "tool.execution_start",
            EventKind::ToolExecutionPartialResult => "tool.execution_partial_result",
            EventKind::ToolExecutionProgress => "tool.execution_progress",
            EventKind::ToolExecutionComplete => "tool.execution_complete",
            EventKind::AssistantMessage => "assistant.message",
        }
    }

    /// Look up a kind by wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionEvent {
    /// Decode an event from its raw wire value
    ///
    /// Distinguishes kinds outside the event model ([`ProtocolError::UnknownEventKind`])
    /// from known kinds with a bad payload ([`ProtocolError::MalformedEvent`]).
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MissingField("type".to_string()))?;

        let Some(kind) = EventKind::from_wire(kind) else {
            return Err(ProtocolError::UnknownEventKind(kind.to_string()));
        };

        serde_json::from_value(value).map_err(|e| ProtocolError::MalformedEvent {
            kind: kind.as_str().to_string(),
            reason: e.to_string(),
        })
    }

    /// Shorthand for a `session.info` event
    pub fn info(message: impl Into<String>) -> Self {
        Self::SessionInfo(SessionMessage {
            message: message.into(),
        })
    }

    /// Shorthand for a `session.error` event
    pub fn error(message: impl Into<String>) -> Self {
        Self::SessionError(SessionMessage {
            message: message.into(),
        })
    }

    /// Shorthand for an `assistant.message` event
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::AssistantMessage(AssistantMessage {
            content: content.into(),
        })
    }

    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::SessionInfo(_) => EventKind::SessionInfo,
            SessionEvent::SessionError(_) => EventKind::SessionError,
            SessionEvent::ToolExecutionStart(_) => EventKind::ToolExecutionStart,
            SessionEvent::ToolExecutionPartialResult(_) => EventKind::ToolExecutionPartialResult,
            SessionEvent::ToolExecutionProgress(_) => EventKind::ToolExecutionProgress,
            SessionEvent::ToolExecutionComplete(_) => EventKind::ToolExecutionComplete,
            SessionEvent::AssistantMessage(_) => EventKind::AssistantMessage,
        }
    }

    /// Tool call this event belongs to, for tool events
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            SessionEvent::ToolExecutionStart(e) => Some(&e.tool_call_id),
            SessionEvent::ToolExecutionPartialResult(e) => Some(&e.tool_call_id),
            SessionEvent::ToolExecutionProgress(e) => Some(&e.tool_call_id),
            SessionEvent::ToolExecutionComplete(e) => Some(&e.tool_call_id),
            _ => None,
        }
    }

    /// Whether this event ends a correlated wait
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::AssistantMessage(_) | SessionEvent::SessionError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_tool_start_wire_format() {
        let event = SessionEvent::from_value(json!({
            "type": "tool.execution_start",
            "data": {"toolName": "list_files", "toolCallId": "1", "arguments": {"path": "."}}
        }))
        .unwrap();

        match &event {
            SessionEvent::ToolExecutionStart(start) => {
                assert_eq!(start.tool_name, "list_files");
                assert_eq!(start.tool_call_id, "1");
                assert_eq!(start.arguments["path"], ".");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(event.tool_call_id(), Some("1"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_complete_without_result_or_error() {
        let event = SessionEvent::from_value(json!({
            "type": "tool.execution_complete",
            "data": {"toolCallId": "7", "success": false}
        }))
        .unwrap();

        let SessionEvent::ToolExecutionComplete(done) = event else {
            panic!("expected completion");
        };
        assert!(!done.success);
        assert_eq!(done.output(), "(no content)");
        assert_eq!(done.error_message(), None);
    }

    #[test]
    fn test_complete_output_prefers_result() {
        let done = ToolExecutionComplete {
            tool_call_id: "1".into(),
            success: true,
            result: Some(ToolResult {
                content: "a.txt,b.txt".into(),
            }),
            error: Some(ToolError {
                message: "ignored".into(),
            }),
        };
        assert_eq!(done.output(), "a.txt,b.txt");
    }

    #[test]
    fn test_unknown_kind_is_distinguished() {
        let err = SessionEvent::from_value(json!({"type": "session.idle", "data": {}})).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownEventKind("session.idle".into()));
    }

    #[test]
    fn test_malformed_known_kind() {
        let err = SessionEvent::from_value(json!({
            "type": "tool.execution_progress",
            "data": {"progressMessage": "half way"}
        }))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEvent { ref kind, .. } if kind == "tool.execution_progress"));
    }

    #[test]
    fn test_missing_type() {
        let err = SessionEvent::from_value(json!({"data": {}})).unwrap_err();
        assert_eq!(err, ProtocolError::MissingField("type".into()));
    }

    #[rstest]
    #[case(SessionEvent::info("hi"), EventKind::SessionInfo, false)]
    #[case(SessionEvent::error("boom"), EventKind::SessionError, true)]
    #[case(SessionEvent::assistant("done"), EventKind::AssistantMessage, true)]
    fn test_kind_and_terminal(
        #[case] event: SessionEvent,
        #[case] kind: EventKind,
        #[case] terminal: bool,
    ) {
        assert_eq!(event.kind(), kind);
        assert_eq!(event.is_terminal(), terminal);
        assert_eq!(event.tool_call_id(), None);
    }

    #[test]
    fn test_kind_wire_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("assistant.delta"), None);
    }

    #[test]
    fn test_serialized_tag_matches_kind() {
        let value = serde_json::to_value(SessionEvent::assistant("Found 2 files")).unwrap();
        assert_eq!(value["type"], "assistant.message");
        assert_eq!(value["data"]["content"], "Found 2 files");
    }
}
