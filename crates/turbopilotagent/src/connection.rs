//! The client's single channel to the agent process
//!
//! One reader task owns the receive side. It answers control requests
//! (`session.create`) through one-shot replies and demultiplexes everything
//! else by session id into per-session inboxes. It never decodes events or
//! runs user code; each session's router does that.

use crate::error::{AgentError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use turbopilot_protocol::protocol::{from_value, to_value};
use turbopilot_protocol::{AgentMessage, ClientMessage, RequestId, SessionId, SessionSpec};
use turbopilot_transport::{AgentTransport, TransportError};

/// Envelope kinds the agent may send; anything else is ignored
const AGENT_MESSAGE_TYPES: [&str; 4] = [
    "session.created",
    "request.failed",
    "session.event",
    "permission.request",
];

const READER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What a session's router receives
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A message addressed to the session
    Agent(AgentMessage),
    /// The channel failed; surfaced to the session as an error event
    Failure(String),
}

pub(crate) type SessionInbox = mpsc::UnboundedReceiver<Inbound>;

type CreateReply = oneshot::Sender<Result<(SessionId, SessionInbox)>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) struct Connection {
    transport: Arc<dyn AgentTransport>,
    sessions: Mutex<HashMap<SessionId, mpsc::UnboundedSender<Inbound>>>,
    pending: Mutex<HashMap<RequestId, CreateReply>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap a transport and start the reader task
    pub(crate) fn open(transport: Arc<dyn AgentTransport>) -> Arc<Self> {
        let connection = Arc::new(Self {
            transport,
            sessions: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            reader: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let handle = tokio::spawn(Arc::clone(&connection).read_loop());
        *lock(&connection.reader) = Some(handle);
        connection
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Serialize and write one message
    pub(crate) async fn send(&self, message: &ClientMessage) -> Result<()> {
        if !self.is_open() {
            return Err(AgentError::NotConnected);
        }
        let value = to_value(message)?;
        self.transport.send_message(value).await?;
        Ok(())
    }

    /// Ask the agent for a session and wait for its id
    ///
    /// The returned inbox is registered before the reply is handed back, so
    /// no event emitted right after creation is lost.
    pub(crate) async fn create_session(
        &self,
        spec: SessionSpec,
        timeout: Duration,
    ) -> Result<(SessionId, SessionInbox)> {
        spec.validate()?;

        let request_id = RequestId::new();
        let (reply, wait) = oneshot::channel();
        lock(&self.pending).insert(request_id.clone(), reply);

        let message = ClientMessage::CreateSession {
            request_id: request_id.clone(),
            config: spec,
        };
        if let Err(err) = self.send(&message).await {
            lock(&self.pending).remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AgentError::NotConnected),
            Err(_) => {
                lock(&self.pending).remove(&request_id);
                Err(AgentError::Timeout(timeout))
            }
        }
    }

    /// Stop routing messages to a session
    pub(crate) fn unregister_session(&self, session_id: &SessionId) {
        lock(&self.sessions).remove(session_id);
    }

    pub(crate) fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Close every session inbox, say goodbye, and close the transport
    pub(crate) async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        lock(&self.sessions).clear();
        for (_, reply) in lock(&self.pending).drain() {
            let _ = reply.send(Err(AgentError::NotConnected));
        }

        if self.transport.is_alive().await {
            if let Ok(value) = to_value(&ClientMessage::Shutdown)
                && let Err(err) = self.transport.send_message(value).await
            {
                tracing::debug!(error = %err, "Failed to send shutdown notice");
            }
        }
        if let Err(err) = self.transport.close().await {
            tracing::warn!(error = %err, "Failed to close transport");
        }

        let reader = lock(&self.reader).take();
        if let Some(mut reader) = reader
            && tokio::time::timeout(READER_SHUTDOWN_GRACE, &mut reader)
                .await
                .is_err()
        {
            tracing::warn!("Reader task did not stop in time, aborting");
            reader.abort();
        }
        tracing::info!("Connection closed");
    }

    async fn read_loop(self: Arc<Self>) {
        loop {
            match self.transport.recv_message().await {
                Ok(Some(value)) => self.route(value).await,
                Ok(None) => {
                    self.fail_all("agent connection closed");
                    break;
                }
                Err(TransportError::Serialization(reason)) => {
                    tracing::warn!(%reason, "Undecodable line from agent");
                    self.broadcast(&format!("undecodable message from agent: {reason}"));
                }
                Err(err) => {
                    self.fail_all(&format!("agent connection failed: {err}"));
                    break;
                }
            }
        }
        tracing::debug!("Reader task finished");
    }

    async fn route(&self, value: serde_json::Value) {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        let message: AgentMessage = match from_value(value) {
            Ok(message) => message,
            Err(err) if AGENT_MESSAGE_TYPES.contains(&kind.as_str()) => {
                tracing::warn!(%kind, error = %err, "Malformed message from agent");
                self.broadcast(&format!("malformed {kind} message: {err}"));
                return;
            }
            Err(_) => {
                tracing::debug!(%kind, "Ignoring unknown message type");
                return;
            }
        };

        match message {
            AgentMessage::SessionCreated {
                request_id,
                session_id,
            } => self.on_session_created(request_id, session_id).await,
            AgentMessage::RequestFailed {
                request_id,
                message,
            } => {
                let reply = lock(&self.pending).remove(&request_id);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(Err(AgentError::RequestFailed(message)));
                    }
                    None => tracing::debug!(%request_id, "Failure for unknown request"),
                }
            }
            message => {
                let Some(session_id) = message.session_id().cloned() else {
                    return;
                };
                let mut sessions = lock(&self.sessions);
                let delivered = sessions
                    .get(&session_id)
                    .is_some_and(|inbox| inbox.send(Inbound::Agent(message)).is_ok());
                if !delivered {
                    sessions.remove(&session_id);
                    tracing::debug!(%session_id, "Dropping message for unknown session");
                }
            }
        }
    }

    async fn on_session_created(&self, request_id: RequestId, session_id: SessionId) {
        let reply = lock(&self.pending).remove(&request_id);
        let Some(reply) = reply else {
            tracing::warn!(%request_id, %session_id, "Session created after its request was abandoned");
            let destroy = ClientMessage::DestroySession { session_id };
            if let Err(err) = self.send(&destroy).await {
                tracing::debug!(error = %err, "Failed to destroy orphan session");
            }
            return;
        };

        let (inbox, rx) = mpsc::unbounded_channel();
        lock(&self.sessions).insert(session_id.clone(), inbox);
        if reply.send(Ok((session_id.clone(), rx))).is_err() {
            lock(&self.sessions).remove(&session_id);
        }
    }

    /// Tell every session the channel misbehaved; sessions stay open
    fn broadcast(&self, reason: &str) {
        for inbox in lock(&self.sessions).values() {
            let _ = inbox.send(Inbound::Failure(reason.to_string()));
        }
    }

    /// Tell every session the channel is gone and close their inboxes
    fn fail_all(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::warn!(%reason, "Agent connection lost");
        for (_, inbox) in lock(&self.sessions).drain() {
            let _ = inbox.send(Inbound::Failure(reason.to_string()));
        }
        for (_, reply) in lock(&self.pending).drain() {
            let _ = reply.send(Err(AgentError::Transport(reason.to_string())));
        }
    }
}
