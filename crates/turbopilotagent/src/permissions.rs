//! Permission gating for tool execution
//!
//! The agent asks before it runs a tool. A [`PermissionGate`] supplied by the
//! caller answers; the [`PermissionEvaluator`] wraps it with the session's
//! exclusion list, a bounded wait, and a fallback for gates that hang or
//! panic. Denied calls are answered with `denied` and a reason, and a
//! compliant agent never emits a `ToolExecutionStart` for them.

use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use turbopilot_protocol::{PermissionDecision, PermissionRequest, RequestId, SessionId};

/// Default bound on how long a gate may take to decide
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a permission request came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionContext {
    /// Session asking
    pub session_id: SessionId,
    /// Agent-assigned id of the request
    pub request_id: RequestId,
}

/// Caller-supplied authorization decision point
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Decide whether the requested tool use may proceed
    async fn decide(
        &self,
        request: &PermissionRequest,
        context: &PermissionContext,
    ) -> PermissionDecision;
}

/// Approves every request
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

#[async_trait]
impl PermissionGate for ApproveAll {
    async fn decide(&self, _: &PermissionRequest, _: &PermissionContext) -> PermissionDecision {
        PermissionDecision::Approved
    }
}

/// Denies every request
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl PermissionGate for DenyAll {
    async fn decide(&self, _: &PermissionRequest, _: &PermissionContext) -> PermissionDecision {
        PermissionDecision::denied("all tool use is denied for this session")
    }
}

/// Adapts a synchronous closure into a gate
///
/// The closure runs on tokio's blocking pool, so it may block (for example to
/// ask a human) without stalling the runtime, and the evaluator's timeout
/// still applies to it.
///
/// ```
/// use turbopilotagent::permissions::FnGate;
/// use turbopilot_protocol::PermissionDecision;
///
/// let gate = FnGate::new(|request, _ctx| {
///     if request.tool_name == "shell" {
///         PermissionDecision::denied("no shell")
///     } else {
///         PermissionDecision::Approved
///     }
/// });
/// # let _ = gate;
/// ```
pub struct FnGate<F> {
    decide: Arc<F>,
}

impl<F> FnGate<F>
where
    F: Fn(&PermissionRequest, &PermissionContext) -> PermissionDecision + Send + Sync + 'static,
{
    /// Wrap a closure
    pub fn new(decide: F) -> Self {
        Self {
            decide: Arc::new(decide),
        }
    }
}

#[async_trait]
impl<F> PermissionGate for FnGate<F>
where
    F: Fn(&PermissionRequest, &PermissionContext) -> PermissionDecision + Send + Sync + 'static,
{
    async fn decide(
        &self,
        request: &PermissionRequest,
        context: &PermissionContext,
    ) -> PermissionDecision {
        let decide = Arc::clone(&self.decide);
        let request = request.clone();
        let context = context.clone();
        match tokio::task::spawn_blocking(move || decide(&request, &context)).await {
            Ok(decision) => decision,
            // Re-raised so the evaluator applies its panic fallback.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => PermissionDecision::denied("permission gate was cancelled"),
        }
    }
}

/// Decision used when the gate does not answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Fail safe: deny
    #[default]
    Deny,
    /// Let the call proceed
    Approve,
}

impl FallbackPolicy {
    fn decision(self, why: &str) -> PermissionDecision {
        match self {
            FallbackPolicy::Deny => PermissionDecision::denied(format!("{why} (fail-safe deny)")),
            FallbackPolicy::Approve => PermissionDecision::Approved,
        }
    }
}

/// Evaluates permission requests for one session
#[derive(Clone)]
pub struct PermissionEvaluator {
    gate: Arc<dyn PermissionGate>,
    excluded_tools: HashSet<String>,
    timeout: Duration,
    fallback: FallbackPolicy,
}

impl PermissionEvaluator {
    /// Create an evaluator around a gate
    pub fn new(gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            gate,
            excluded_tools: HashSet::new(),
            timeout: DEFAULT_PERMISSION_TIMEOUT,
            fallback: FallbackPolicy::default(),
        }
    }

    /// Tools denied without consulting the gate
    pub fn with_excluded_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Bound on the gate's decision time
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Decision applied on timeout or gate panic
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Produce a decision for a request; never fails
    pub async fn evaluate(
        &self,
        request: &PermissionRequest,
        context: &PermissionContext,
    ) -> PermissionDecision {
        let decision = if self.excluded_tools.contains(&request.tool_name) {
            PermissionDecision::denied(format!(
                "tool '{}' is excluded from this session",
                request.tool_name
            ))
        } else {
            let decide = AssertUnwindSafe(self.gate.decide(request, context)).catch_unwind();
            match tokio::time::timeout(self.timeout, decide).await {
                Ok(Ok(decision)) => decision,
                Ok(Err(_)) => {
                    tracing::warn!(
                        session_id = %context.session_id,
                        tool = %request.tool_name,
                        "Permission gate panicked"
                    );
                    self.fallback.decision("permission gate panicked")
                }
                Err(_) => {
                    tracing::warn!(
                        session_id = %context.session_id,
                        tool = %request.tool_name,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Permission gate timed out"
                    );
                    self.fallback.decision("permission check timed out")
                }
            }
        };

        tracing::info!(
            session_id = %context.session_id,
            request_id = %context.request_id,
            kind = ?request.kind,
            tool = %request.tool_name,
            approved = decision.is_approved(),
            reason = decision.reason().unwrap_or(""),
            "Permission decided"
        );
        decision
    }
}
