//! Session state tracking

use chrono::{DateTime, Utc};
use turbopilot_protocol::SessionId;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// Accepting prompts and delivering events
    Active,
    /// Destroyed by the caller, or its connection went away
    Destroyed,
}

/// Snapshot of a session's state
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Agent-assigned identity
    pub session_id: SessionId,

    /// Current lifecycle stage
    pub lifecycle: SessionLifecycle,

    /// Model the session was created with
    pub model: Option<String>,

    /// When the agent confirmed the session
    pub created_at: DateTime<Utc>,

    /// Prompts submitted so far
    pub prompts_sent: u64,

    /// Events received so far, malformed ones included
    pub events_received: u64,

    /// When the last event arrived
    pub last_event_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub(crate) fn new(session_id: SessionId, model: Option<String>) -> Self {
        Self {
            session_id,
            lifecycle: SessionLifecycle::Active,
            model,
            created_at: Utc::now(),
            prompts_sent: 0,
            events_received: 0,
            last_event_at: None,
        }
    }

    /// Whether the session still accepts prompts
    pub fn is_active(&self) -> bool {
        self.lifecycle == SessionLifecycle::Active
    }

    pub(crate) fn record_event(&mut self) {
        self.events_received += 1;
        self.last_event_at = Some(Utc::now());
    }

    pub(crate) fn record_prompt(&mut self) {
        self.prompts_sent += 1;
    }

    /// Move to `Destroyed`; returns false if already there
    pub(crate) fn mark_destroyed(&mut self) -> bool {
        let was_active = self.is_active();
        self.lifecycle = SessionLifecycle::Destroyed;
        was_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_active() {
        let state = SessionState::new(SessionId::new("s-1"), Some("gpt-4.1".into()));

        assert!(state.is_active());
        assert_eq!(state.prompts_sent, 0);
        assert_eq!(state.events_received, 0);
        assert!(state.last_event_at.is_none());
    }

    #[test]
    fn test_counters() {
        let mut state = SessionState::new(SessionId::new("s-1"), None);
        state.record_prompt();
        state.record_event();
        state.record_event();

        assert_eq!(state.prompts_sent, 1);
        assert_eq!(state.events_received, 2);
        assert!(state.last_event_at.is_some());
    }

    #[test]
    fn test_destroy_only_once() {
        let mut state = SessionState::new(SessionId::new("s-1"), None);

        assert!(state.mark_destroyed());
        assert!(!state.mark_destroyed());
        assert_eq!(state.lifecycle, SessionLifecycle::Destroyed);
    }
}
