//! Error types for the agent SDK
//!
//! Errors implement the [`ErrorRecovery`] trait, which tells callers whether
//! a failure is worth retrying, what to do about it, and how long to wait
//! between attempts.

use std::time::Duration;
use thiserror::Error;
use turbopilot_protocol::ProtocolError;
use turbopilot_transport::TransportError;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Backoff strategy for retrying operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No backoff (don't retry)
    None,

    /// Linear backoff: base_ms * attempt_number
    Linear {
        /// Base delay in milliseconds
        base_ms: u64,
    },

    /// Exponential backoff: base_ms * 2^(attempt-1), capped at max_ms
    Exponential {
        /// Base delay in milliseconds
        base_ms: u64,
        /// Maximum delay cap in milliseconds
        max_ms: u64,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt number (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            BackoffStrategy::None => None,
            BackoffStrategy::Linear { base_ms } => {
                Some(Duration::from_millis(base_ms.saturating_mul(attempt as u64)))
            }
            BackoffStrategy::Exponential { base_ms, max_ms } => {
                let delay_ms =
                    base_ms.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
                Some(Duration::from_millis(delay_ms.min(*max_ms)))
            }
        }
    }
}

/// Recovery guidance attached to an error
pub trait ErrorRecovery {
    /// Whether this error should be retried
    fn is_retriable(&self) -> bool;

    /// User-facing action to take
    fn suggested_action(&self) -> &str;

    /// Maximum number of retry attempts (None = don't retry)
    fn max_retries(&self) -> Option<u32>;

    /// Backoff strategy for retries
    fn backoff_strategy(&self) -> BackoffStrategy;
}

/// Errors that can occur in agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// No terminal event arrived within the caller's deadline
    #[error("Timed out after {}ms waiting for a reply", .0.as_millis())]
    Timeout(Duration),

    /// The agent reported a session error while a reply was awaited
    #[error("Session error: {0}")]
    SessionFailure(String),

    /// The session was destroyed or its connection went away
    #[error("Session is closed")]
    SessionClosed,

    /// A tool call failed and the session treats tool failures as terminal
    #[error("Tool call {tool_call_id} failed: {message}")]
    ToolExecutionFailure {
        /// Failing tool call
        tool_call_id: String,
        /// Failure output reported by the agent
        message: String,
    },

    /// Another `send_and_wait` is already in flight on this session
    #[error("A reply is already being awaited on this session")]
    Busy,

    /// The client has not been started or has been stopped
    #[error("Client is not connected")]
    NotConnected,

    /// The agent CLI executable does not exist at the configured path
    #[error("Agent CLI not found: {0}")]
    CliNotFound(String),

    /// Transport error (subprocess communication, broken pipe)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error (malformed messages, invalid session spec)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The agent refused a control request
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Configuration error (invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PartialEq for AgentError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Timeout(a), Self::Timeout(b)) => a == b,
            (Self::SessionFailure(a), Self::SessionFailure(b)) => a == b,
            (Self::SessionClosed, Self::SessionClosed) => true,
            (
                Self::ToolExecutionFailure {
                    tool_call_id: a,
                    message: m,
                },
                Self::ToolExecutionFailure {
                    tool_call_id: b,
                    message: n,
                },
            ) => a == b && m == n,
            (Self::Busy, Self::Busy) => true,
            (Self::NotConnected, Self::NotConnected) => true,
            (Self::CliNotFound(a), Self::CliNotFound(b)) => a == b,
            (Self::Transport(a), Self::Transport(b)) => a == b,
            (Self::Protocol(a), Self::Protocol(b)) => a == b,
            (Self::RequestFailed(a), Self::RequestFailed(b)) => a == b,
            (Self::Config(a), Self::Config(b)) => a == b,
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind() && a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl From<TransportError> for AgentError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotFound(path) => Self::CliNotFound(path),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<ProtocolError> for AgentError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl ErrorRecovery for AgentError {
    fn is_retriable(&self) -> bool {
        match self {
            // Only the subprocess link is worth retrying. A timed-out or busy
            // wait depends on the caller, who decides whether to resend.
            Self::Transport(_) => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }

    fn suggested_action(&self) -> &str {
        match self {
            Self::Timeout(_) => {
                "No reply arrived in time. Raise the timeout or simplify the prompt \
                and send it again."
            }
            Self::SessionFailure(_) => {
                "The agent reported an error. Check the agent logs and session \
                configuration before retrying."
            }
            Self::SessionClosed => "The session is gone. Create a new session.",
            Self::ToolExecutionFailure { .. } => {
                "A tool call failed. Inspect the tool output or disable \
                tool_failure_is_terminal to let the agent recover."
            }
            Self::Busy => "Wait for the pending reply before sending another prompt.",
            Self::NotConnected => "Call start() on the client before creating sessions.",
            Self::CliNotFound(_) => {
                "The agent CLI is not installed at the configured path. Set cli_path \
                or TURBOPILOT_CLI_PATH."
            }
            Self::Transport(msg) => {
                if msg.contains("closed") || msg.contains("Broken pipe") {
                    "Connection to the agent process was lost. Restart the client."
                } else {
                    "Transport error detected. Check that the agent CLI is installed \
                    and its path is correct."
                }
            }
            Self::Protocol(_) => {
                "Protocol violation detected. Check that the agent CLI version \
                matches this SDK."
            }
            Self::RequestFailed(_) => {
                "The agent refused the request. Check the session configuration."
            }
            Self::Config(_) => "Invalid configuration. Fix it and create a new session.",
            Self::Io(err) => match err.kind() {
                std::io::ErrorKind::NotFound => "File not found. Check file path exists.",
                std::io::ErrorKind::PermissionDenied => {
                    "File permission denied. Check file permissions."
                }
                std::io::ErrorKind::Interrupted => "I/O operation interrupted. Will auto-retry.",
                _ => "I/O error occurred. Check file system health.",
            },
        }
    }

    fn max_retries(&self) -> Option<u32> {
        match self {
            Self::Transport(_) => Some(5),
            Self::Io(err) if err.kind() == std::io::ErrorKind::Interrupted => Some(3),
            _ => None,
        }
    }

    fn backoff_strategy(&self) -> BackoffStrategy {
        match self {
            Self::Transport(_) => BackoffStrategy::Exponential {
                base_ms: 500,
                max_ms: 60_000,
            },
            Self::Io(err) if err.kind() == std::io::ErrorKind::Interrupted => {
                BackoffStrategy::Linear { base_ms: 1000 }
            }
            _ => BackoffStrategy::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_transport_error_retriable() {
        let err = AgentError::Transport("connection lost".to_string());
        assert!(err.is_retriable());
        assert_eq!(err.max_retries(), Some(5));
    }

    #[rstest]
    #[case(AgentError::SessionClosed)]
    #[case(AgentError::SessionFailure("boom".into()))]
    #[case(AgentError::Config("bad".into()))]
    #[case(AgentError::Protocol("invalid".into()))]
    #[case(AgentError::Busy)]
    #[case(AgentError::Timeout(Duration::from_secs(1)))]
    #[case(AgentError::CliNotFound("/opt/agent".into()))]
    fn test_permanent_errors_not_retriable(#[case] err: AgentError) {
        assert!(!err.is_retriable());
        assert_eq!(err.max_retries(), None);
        assert_eq!(err.backoff_strategy(), BackoffStrategy::None);
    }

    #[test]
    fn test_timeout_display_in_millis() {
        let err = AgentError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Timed out after 250ms waiting for a reply");
    }

    #[test]
    fn test_transport_conversion() {
        let err: AgentError = TransportError::Closed.into();
        assert_eq!(err, AgentError::Transport("Transport closed".into()));
        assert!(err.suggested_action().contains("lost"));
    }

    #[test]
    fn test_missing_cli_conversion() {
        let err: AgentError = TransportError::NotFound("/opt/agent".into()).into();
        assert_eq!(err, AgentError::CliNotFound("/opt/agent".into()));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_backoff_strategy_linear() {
        let strategy = BackoffStrategy::Linear { base_ms: 100 };
        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_backoff_strategy_exponential() {
        let strategy = BackoffStrategy::Exponential {
            base_ms: 100,
            max_ms: 10_000,
        };
        assert_eq!(strategy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(strategy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(strategy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert_eq!(
            strategy.delay_for_attempt(10),
            Some(Duration::from_millis(10_000))
        );
    }
}
