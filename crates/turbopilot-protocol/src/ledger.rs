//! Per-tool-call lifecycle tracking
//!
//! For a single `tool_call_id` the agent emits `Start`, then any number of
//! interleaved `Progress` / `PartialResult` events, then exactly one
//! `Complete`. [`ToolCallLedger`] follows each call through that lifecycle and
//! reports deviations. It never reorders or drops events.
//!
//! Running calls are kept until they complete. Completed calls are kept only
//! for the most recent [`DEFAULT_COMPLETED_RETENTION`] ids, so a long session
//! holds bounded state; an event for an evicted call reads as one that never
//! started.

use crate::event::{EventKind, SessionEvent};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Completed calls remembered for duplicate detection
pub const DEFAULT_COMPLETED_RETENTION: usize = 1024;

/// Lifecycle phase of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallPhase {
    /// `Start` seen, no `Complete` yet
    Running,
    /// `Complete` seen
    Completed,
}

/// A deviation from the per-call lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderViolation {
    /// Offending tool call
    pub tool_call_id: String,
    /// Event kind that arrived out of order
    pub kind: EventKind,
    /// Phase the call was in, `None` if never started
    pub phase: Option<ToolCallPhase>,
}

impl fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            None => write!(
                f,
                "{} for tool call {} before its start",
                self.kind, self.tool_call_id
            ),
            Some(ToolCallPhase::Running) => write!(
                f,
                "duplicate start for running tool call {}",
                self.tool_call_id
            ),
            Some(ToolCallPhase::Completed) => write!(
                f,
                "{} for tool call {} after completion",
                self.kind, self.tool_call_id
            ),
        }
    }
}

/// Tracks tool calls seen on one session
#[derive(Debug)]
pub struct ToolCallLedger {
    calls: HashMap<String, ToolCallPhase>,
    completed: VecDeque<String>,
    retention: usize,
}

impl Default for ToolCallLedger {
    fn default() -> Self {
        Self::with_retention(DEFAULT_COMPLETED_RETENTION)
    }
}

impl ToolCallLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger remembering at most `retention` completed calls
    pub fn with_retention(retention: usize) -> Self {
        Self {
            calls: HashMap::new(),
            completed: VecDeque::new(),
            retention,
        }
    }

    /// Record an event, returning a violation if it breaks the lifecycle
    ///
    /// Non-tool events are accepted unconditionally.
    pub fn observe(&mut self, event: &SessionEvent) -> Result<(), OrderViolation> {
        let Some(id) = event.tool_call_id() else {
            return Ok(());
        };
        let kind = event.kind();
        let phase = self.calls.get(id).copied();

        let next = match (kind, phase) {
            (EventKind::ToolExecutionStart, None) => ToolCallPhase::Running,
            (EventKind::ToolExecutionComplete, Some(ToolCallPhase::Running)) => {
                ToolCallPhase::Completed
            }
            (
                EventKind::ToolExecutionProgress | EventKind::ToolExecutionPartialResult,
                Some(ToolCallPhase::Running),
            ) => ToolCallPhase::Running,
            _ => {
                return Err(OrderViolation {
                    tool_call_id: id.to_string(),
                    kind,
                    phase,
                });
            }
        };

        self.calls.insert(id.to_string(), next);
        if next == ToolCallPhase::Completed {
            self.completed.push_back(id.to_string());
            while self.completed.len() > self.retention {
                if let Some(evicted) = self.completed.pop_front() {
                    self.calls.remove(&evicted);
                }
            }
        }
        Ok(())
    }

    /// Current phase of a tool call
    pub fn phase(&self, tool_call_id: &str) -> Option<ToolCallPhase> {
        self.calls.get(tool_call_id).copied()
    }

    /// Number of calls currently tracked, running or completed
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no call is tracked
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Ids of calls that started but have not completed
    pub fn running(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|(_, phase)| **phase == ToolCallPhase::Running)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}
