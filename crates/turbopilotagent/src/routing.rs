//! Per-session message router
//!
//! Each session owns one router task fed by its inbox. The router decodes
//! events, checks per-tool-call ordering, fans events out to subscribers,
//! resolves the correlator, and hands permission requests to the evaluator on
//! separate tasks so a slow gate never stalls event delivery.

use crate::connection::{Connection, Inbound, SessionInbox};
use crate::correlator::Correlator;
use crate::dispatch::EventDispatcher;
use crate::permissions::{PermissionContext, PermissionEvaluator};
use crate::session::SessionState;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use turbopilot_protocol::{
    AgentMessage, ClientMessage, PermissionRequest, ProtocolError, RequestId, SessionEvent,
    SessionId, ToolCallLedger,
};

pub(crate) struct SessionRouter {
    pub(crate) session_id: SessionId,
    pub(crate) connection: Arc<Connection>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) correlator: Arc<Correlator>,
    pub(crate) evaluator: PermissionEvaluator,
    pub(crate) state: Arc<Mutex<SessionState>>,
}

impl SessionRouter {
    /// Start routing the inbox on its own task
    pub(crate) fn spawn(self, inbox: SessionInbox) -> JoinHandle<()> {
        tokio::spawn(self.run(inbox))
    }

    async fn run(self, mut inbox: SessionInbox) {
        let mut ledger = ToolCallLedger::new();

        while let Some(inbound) = inbox.recv().await {
            match inbound {
                Inbound::Agent(AgentMessage::Event { event, .. }) => {
                    if let Some(event) = self.decode(event) {
                        self.deliver(&mut ledger, event).await;
                    }
                }
                Inbound::Agent(AgentMessage::PermissionRequest {
                    request_id,
                    request,
                    ..
                }) => self.evaluate_permission(request_id, request),
                Inbound::Agent(other) => {
                    tracing::debug!(session_id = %self.session_id, message = ?other, "Ignoring control message");
                }
                Inbound::Failure(reason) => {
                    self.deliver(&mut ledger, SessionEvent::error(reason)).await;
                }
            }
        }

        // Inbox closed: destroyed, client stopped, or connection lost.
        self.correlator.close();
        self.dispatcher.close();
        self.state.lock().await.mark_destroyed();
        tracing::debug!(session_id = %self.session_id, "Session router stopped");
    }

    fn decode(&self, raw: Value) -> Option<SessionEvent> {
        match SessionEvent::from_value(raw) {
            Ok(event) => Some(event),
            Err(ProtocolError::UnknownEventKind(kind)) => {
                tracing::debug!(session_id = %self.session_id, %kind, "Ignoring unknown event kind");
                None
            }
            Err(err) => {
                tracing::warn!(session_id = %self.session_id, error = %err, "Malformed event");
                Some(SessionEvent::error(err.to_string()))
            }
        }
    }

    async fn deliver(&self, ledger: &mut ToolCallLedger, event: SessionEvent) {
        if let Err(violation) = ledger.observe(&event) {
            tracing::warn!(session_id = %self.session_id, %violation, "Tool call order violation");
        }
        tracing::debug!(
            session_id = %self.session_id,
            kind = %event.kind(),
            tool_call_id = event.tool_call_id().unwrap_or(""),
            "Event received"
        );
        self.state.lock().await.record_event();

        // Subscribers must have the event queued before the waiter wakes.
        let event = Arc::new(event);
        self.dispatcher.dispatch(Arc::clone(&event));
        self.correlator.observe(&event);
    }

    fn evaluate_permission(&self, request_id: RequestId, request: PermissionRequest) {
        let evaluator = self.evaluator.clone();
        let connection = Arc::clone(&self.connection);
        let context = PermissionContext {
            session_id: self.session_id.clone(),
            request_id,
        };

        tokio::spawn(async move {
            let decision = evaluator.evaluate(&request, &context).await;
            let response = ClientMessage::PermissionResponse {
                session_id: context.session_id,
                request_id: context.request_id,
                decision,
            };
            if let Err(err) = connection.send(&response).await {
                tracing::warn!(error = %err, "Failed to answer permission request");
            }
        });
    }
}
