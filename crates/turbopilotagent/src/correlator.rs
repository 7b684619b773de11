//! Turns a session's event stream into a single request/response call
//!
//! The agent protocol carries no id linking a prompt to its reply, so at most
//! one correlated request may be in flight per session: the next terminal
//! event after submission resolves it. A second concurrent request is
//! rejected with [`AgentError::Busy`].
//!
//! A request abandoned after its prompt went out still owes a reply. Such
//! replies are counted and the next terminal events pay them off before any
//! newer request can be resolved, so a late reply never reaches the wrong
//! caller. An owed reply that has not shown up within [`ORPHAN_REPLY_GRACE`]
//! is written off.

use crate::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use turbopilot_protocol::SessionEvent;

/// How long a reply owed to an abandoned request is waited for
pub const ORPHAN_REPLY_GRACE: Duration = Duration::from_secs(120);

/// Metadata of the request currently awaiting a reply
#[derive(Debug, Clone)]
pub struct CorrelatedRequest {
    /// Submitted prompt
    pub prompt: String,
    /// When the prompt was registered
    pub submitted_at: DateTime<Utc>,
    /// How long the caller is willing to wait
    pub timeout: Duration,
}

impl CorrelatedRequest {
    pub(crate) fn new(prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            submitted_at: Utc::now(),
            timeout,
        }
    }
}

/// Identifies one registration so a late abandon cannot clear a newer wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

#[derive(Debug)]
struct Pending {
    ticket: Ticket,
    request: CorrelatedRequest,
    reply: oneshot::Sender<Result<String>>,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Pending>,
    next_ticket: u64,
    /// Expiry of each reply still due to a request nobody waits on anymore
    orphans: VecDeque<Instant>,
    closed: bool,
}

impl Slot {
    fn prune_orphans(&mut self) {
        let now = Instant::now();
        let before = self.orphans.len();
        self.orphans.retain(|expires| *expires > now);
        if self.orphans.len() < before {
            tracing::warn!(
                expired = before - self.orphans.len(),
                "Gave up on replies owed to abandoned requests"
            );
        }
    }
}

/// A live registration; abandons it when dropped unless resolved
///
/// Dropping the claim covers every way out of a wait: timeout, failed
/// submission, or the caller's future being dropped.
#[derive(Debug)]
pub(crate) struct Claim<'a> {
    correlator: &'a Correlator,
    ticket: Ticket,
    submitted: bool,
    active: bool,
}

impl Claim<'_> {
    /// The prompt reached the agent, so a reply is now owed
    pub(crate) fn submitted(&mut self) {
        self.submitted = true;
    }

    /// The wait ended with an outcome; nothing to abandon
    pub(crate) fn resolved(mut self) {
        self.active = false;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.active {
            self.correlator.abandon(self.ticket, self.submitted);
        }
    }
}

#[derive(Debug)]
pub(crate) struct Correlator {
    slot: Mutex<Slot>,
    tool_failure_is_terminal: bool,
}

impl Correlator {
    pub(crate) fn new(tool_failure_is_terminal: bool) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            tool_failure_is_terminal,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the single in-flight slot
    pub(crate) fn register(
        &self,
        request: CorrelatedRequest,
    ) -> Result<(Claim<'_>, oneshot::Receiver<Result<String>>)> {
        let mut slot = self.lock();
        if slot.closed {
            return Err(AgentError::SessionClosed);
        }
        if slot.pending.is_some() {
            return Err(AgentError::Busy);
        }
        slot.next_ticket += 1;
        let ticket = Ticket(slot.next_ticket);
        let (reply, wait) = oneshot::channel();
        slot.pending = Some(Pending {
            ticket,
            request,
            reply,
        });
        let claim = Claim {
            correlator: self,
            ticket,
            submitted: false,
            active: true,
        };
        Ok((claim, wait))
    }

    fn abandon(&self, ticket: Ticket, submitted: bool) {
        let mut slot = self.lock();
        if !slot.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            return;
        }
        slot.pending = None;
        if submitted {
            slot.orphans.push_back(Instant::now() + ORPHAN_REPLY_GRACE);
            tracing::debug!(orphaned = slot.orphans.len(), "Abandoned a submitted request");
        }
    }

    /// Feed an event; resolves the pending request if the event ends it
    pub(crate) fn observe(&self, event: &SessionEvent) {
        let outcome = match event {
            SessionEvent::AssistantMessage(message) => Ok(message.content.clone()),
            SessionEvent::SessionError(error) => {
                Err(AgentError::SessionFailure(error.message.clone()))
            }
            SessionEvent::ToolExecutionComplete(complete)
                if self.tool_failure_is_terminal && !complete.success =>
            {
                Err(AgentError::ToolExecutionFailure {
                    tool_call_id: complete.tool_call_id.clone(),
                    message: complete.output().to_string(),
                })
            }
            _ => return,
        };

        let pending = {
            let mut slot = self.lock();
            slot.prune_orphans();
            if !slot.orphans.is_empty() {
                // A failed tool call belongs to the abandoned turn but does
                // not end it; only the reply or a session error does.
                if !matches!(event, SessionEvent::ToolExecutionComplete(_)) {
                    slot.orphans.pop_front();
                }
                tracing::debug!(kind = %event.kind(), orphaned = slot.orphans.len(), "Dropping reply to an abandoned request");
                return;
            }
            slot.pending.take()
        };
        let Some(pending) = pending else {
            tracing::trace!(kind = %event.kind(), "Terminal event with no pending request");
            return;
        };

        let elapsed = Utc::now() - pending.request.submitted_at;
        tracing::debug!(
            prompt_len = pending.request.prompt.len(),
            elapsed_ms = elapsed.num_milliseconds(),
            ok = outcome.is_ok(),
            "Correlated request resolved"
        );
        // The waiter may have timed out in the meantime; the outcome is dropped.
        let _ = pending.reply.send(outcome);
    }

    /// Fail any pending request and refuse new ones
    pub(crate) fn close(&self) {
        let mut slot = self.lock();
        slot.closed = true;
        if let Some(pending) = slot.pending.take() {
            let _ = pending.reply.send(Err(AgentError::SessionClosed));
        }
    }

    /// The request currently awaiting a reply, if any
    pub(crate) fn pending(&self) -> Option<CorrelatedRequest> {
        self.lock().pending.as_ref().map(|p| p.request.clone())
    }

    /// Replies still owed to abandoned requests
    pub(crate) fn orphaned(&self) -> usize {
        let mut slot = self.lock();
        slot.prune_orphans();
        slot.orphans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use turbopilot_protocol::{ToolError, ToolExecutionComplete};

    const WAIT: Duration = Duration::from_secs(5);

    fn failed_tool() -> SessionEvent {
        SessionEvent::ToolExecutionComplete(ToolExecutionComplete {
            tool_call_id: "call-1".into(),
            success: false,
            result: None,
            error: Some(ToolError {
                message: "navigation failed".into(),
            }),
        })
    }

    #[tokio::test]
    async fn test_assistant_message_resolves() {
        let correlator = Correlator::new(false);
        let (_claim, wait) = correlator.register(CorrelatedRequest::new("hi", WAIT)).unwrap();

        correlator.observe(&SessionEvent::info("thinking"));
        correlator.observe(&SessionEvent::assistant("hello"));

        assert_eq!(wait.await.unwrap(), Ok("hello".to_string()));
        assert!(correlator.pending().is_none());
    }

    #[tokio::test]
    async fn test_session_error_fails_wait() {
        let correlator = Correlator::new(false);
        let (_claim, wait) = correlator.register(CorrelatedRequest::new("hi", WAIT)).unwrap();

        correlator.observe(&SessionEvent::error("model unavailable"));

        assert_eq!(
            wait.await.unwrap(),
            Err(AgentError::SessionFailure("model unavailable".into()))
        );
    }

    #[rstest]
    #[case(false, false)]
    #[case(true, true)]
    #[tokio::test]
    async fn test_tool_failure_policy(#[case] terminal: bool, #[case] resolves: bool) {
        let correlator = Correlator::new(terminal);
        let (_claim, mut wait) = correlator.register(CorrelatedRequest::new("go", WAIT)).unwrap();

        correlator.observe(&failed_tool());

        if resolves {
            assert_eq!(
                wait.try_recv().unwrap(),
                Err(AgentError::ToolExecutionFailure {
                    tool_call_id: "call-1".into(),
                    message: "navigation failed".into(),
                })
            );
        } else {
            assert!(wait.try_recv().is_err());
            assert!(correlator.pending().is_some());
        }
    }

    #[test]
    fn test_second_register_is_busy() {
        let correlator = Correlator::new(false);
        let _first = correlator.register(CorrelatedRequest::new("a", WAIT)).unwrap();

        assert_eq!(
            correlator.register(CorrelatedRequest::new("b", WAIT)).unwrap_err(),
            AgentError::Busy
        );
    }

    #[test]
    fn test_stale_claim_keeps_newer_wait() {
        let correlator = Correlator::new(false);
        let (mut old, _old_wait) = correlator.register(CorrelatedRequest::new("a", WAIT)).unwrap();
        old.submitted();
        correlator.observe(&SessionEvent::assistant("for a"));
        let (_new, _new_wait) = correlator.register(CorrelatedRequest::new("b", WAIT)).unwrap();

        drop(old);

        assert_eq!(correlator.pending().unwrap().prompt, "b");
        assert_eq!(correlator.orphaned(), 0);
    }

    #[test]
    fn test_unsubmitted_claim_owes_nothing() {
        let correlator = Correlator::new(false);
        let (claim, _) = correlator.register(CorrelatedRequest::new("a", WAIT)).unwrap();

        drop(claim);

        assert!(correlator.pending().is_none());
        assert_eq!(correlator.orphaned(), 0);
    }

    #[tokio::test]
    async fn test_late_reply_goes_to_abandoned_request() {
        let correlator = Correlator::new(false);
        let (mut slow, _) = correlator.register(CorrelatedRequest::new("slow", WAIT)).unwrap();
        slow.submitted();
        drop(slow);
        let (mut fast, mut wait) = correlator.register(CorrelatedRequest::new("fast", WAIT)).unwrap();
        fast.submitted();

        correlator.observe(&SessionEvent::assistant("late"));
        assert!(wait.try_recv().is_err());
        assert_eq!(correlator.orphaned(), 0);

        correlator.observe(&SessionEvent::assistant("fresh"));
        assert_eq!(wait.await.unwrap(), Ok("fresh".to_string()));
        fast.resolved();
    }

    #[rstest]
    #[case(SessionEvent::error("late failure"))]
    #[case(SessionEvent::assistant("late reply"))]
    fn test_terminal_events_pay_off_orphans(#[case] event: SessionEvent) {
        let correlator = Correlator::new(true);
        let (mut claim, _) = correlator.register(CorrelatedRequest::new("a", WAIT)).unwrap();
        claim.submitted();
        drop(claim);

        correlator.observe(&failed_tool());
        assert_eq!(correlator.orphaned(), 1);
        correlator.observe(&event);
        assert_eq!(correlator.orphaned(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_orphan_expires() {
        let correlator = Correlator::new(false);
        let (mut lost, _) = correlator.register(CorrelatedRequest::new("lost", WAIT)).unwrap();
        lost.submitted();
        drop(lost);
        assert_eq!(correlator.orphaned(), 1);

        tokio::time::advance(ORPHAN_REPLY_GRACE + Duration::from_secs(1)).await;

        let (_claim, wait) = correlator.register(CorrelatedRequest::new("next", WAIT)).unwrap();
        correlator.observe(&SessionEvent::assistant("answer"));
        assert_eq!(wait.await.unwrap(), Ok("answer".to_string()));
        assert_eq!(correlator.orphaned(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_rejects_new() {
        let correlator = Correlator::new(false);
        let (_claim, wait) = correlator.register(CorrelatedRequest::new("a", WAIT)).unwrap();

        correlator.close();

        assert_eq!(wait.await.unwrap(), Err(AgentError::SessionClosed));
        assert_eq!(
            correlator.register(CorrelatedRequest::new("b", WAIT)).unwrap_err(),
            AgentError::SessionClosed
        );
    }

    #[test]
    fn test_terminal_event_without_wait_is_ignored() {
        let correlator = Correlator::new(false);
        correlator.observe(&SessionEvent::assistant("unsolicited"));
        assert!(correlator.pending().is_none());
    }
}
