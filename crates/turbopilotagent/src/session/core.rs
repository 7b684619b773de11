//! Core session management
//!
//! Provides the `AgentSession` struct, event subscription and teardown.

use crate::config::SessionConfig;
use crate::connection::{Connection, SessionInbox};
use crate::correlator::{CorrelatedRequest, Correlator};
use crate::dispatch::{EventDispatcher, EventSubscriber, Subscription};
use crate::error::{AgentError, Result};
use crate::routing::SessionRouter;
use crate::session::state::SessionState;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use turbopilot_protocol::{ClientMessage, SessionEvent, SessionId};

const ROUTER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A conversational context with the agent
///
/// Obtained from [`crate::AgentClient::create_session`]. Events are delivered
/// to subscribers on their own tasks; prompts go out through
/// [`AgentSession::send`] or [`AgentSession::send_and_wait`].
pub struct AgentSession {
    pub(crate) id: SessionId,

    pub(crate) connection: Arc<Connection>,

    pub(crate) config: Arc<SessionConfig>,

    pub(crate) dispatcher: Arc<EventDispatcher>,

    pub(crate) correlator: Arc<Correlator>,

    pub(crate) state: Arc<Mutex<SessionState>>,

    router: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AgentSession {
    /// Wire a freshly created session to its inbox
    pub(crate) fn open(
        connection: Arc<Connection>,
        id: SessionId,
        inbox: SessionInbox,
        config: SessionConfig,
    ) -> Self {
        let dispatcher = EventDispatcher::new();
        let correlator = Arc::new(Correlator::new(config.tool_failure_is_terminal));
        let state = Arc::new(Mutex::new(SessionState::new(
            id.clone(),
            config.model.clone(),
        )));

        let router = SessionRouter {
            session_id: id.clone(),
            connection: Arc::clone(&connection),
            dispatcher: Arc::clone(&dispatcher),
            correlator: Arc::clone(&correlator),
            evaluator: config.evaluator(),
            state: Arc::clone(&state),
        }
        .spawn(inbox);

        tracing::info!(session_id = %id, model = config.model.as_deref().unwrap_or("default"), "Session created");

        Self {
            id,
            connection,
            config: Arc::new(config),
            dispatcher,
            correlator,
            state,
            router: std::sync::Mutex::new(Some(router)),
        }
    }

    /// Agent-assigned identity
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the session state
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Whether the session still accepts prompts
    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_active()
    }

    /// The `send_and_wait` currently in flight, if any
    pub fn pending_request(&self) -> Option<CorrelatedRequest> {
        self.correlator.pending()
    }

    /// Register a subscriber for every subsequent event
    ///
    /// Each subscriber is driven by its own task: it sees events one at a
    /// time in emission order, independently of other subscribers. A panic
    /// in the handler is logged and does not stop later deliveries.
    pub fn subscribe(&self, subscriber: impl EventSubscriber) -> Subscription {
        self.dispatcher.subscribe(subscriber)
    }

    /// Number of attached subscribers and streams
    pub fn subscriber_count(&self) -> usize {
        self.dispatcher.subscriber_count()
    }

    /// Every subsequent event as a stream
    ///
    /// The stream ends once the session is destroyed or its connection goes
    /// away.
    pub fn event_stream(&self) -> BoxStream<'static, SessionEvent> {
        self.dispatcher.stream()
    }

    /// Wait until every subscriber has handled the events received so far
    pub async fn flush_events(&self) {
        self.dispatcher.flush().await;
    }

    /// Tear the session down
    ///
    /// A pending `send_and_wait` resolves with [`AgentError::SessionClosed`]
    /// and no further events are delivered. Calling it again returns
    /// `SessionClosed`.
    pub async fn destroy(&self) -> Result<()> {
        if !self.state.lock().await.mark_destroyed() {
            return Err(AgentError::SessionClosed);
        }

        self.connection.unregister_session(&self.id);
        self.correlator.close();
        self.dispatcher.close();

        let destroy = ClientMessage::DestroySession {
            session_id: self.id.clone(),
        };
        if let Err(err) = self.connection.send(&destroy).await {
            tracing::debug!(session_id = %self.id, error = %err, "Destroy not delivered");
        }

        let router = self
            .router
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut router) = router
            && tokio::time::timeout(ROUTER_SHUTDOWN_GRACE, &mut router)
                .await
                .is_err()
        {
            router.abort();
        }

        tracing::info!(session_id = %self.id, "Session destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
