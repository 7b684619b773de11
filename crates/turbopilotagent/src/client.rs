//! Main client for the agent SDK

use crate::config::{ClientConfig, SessionConfig};
use crate::connection::Connection;
use crate::error::{AgentError, Result};
use crate::retry::retry_with_recovery;
use crate::session::AgentSession;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use turbopilot_transport::{AgentTransport, CliTransport};

/// Process-wide handle on the agent connection and session factory
pub struct AgentClient {
    config: ClientConfig,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl AgentClient {
    /// Create a client; nothing is spawned until [`AgentClient::start`]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// Create a client already attached to a transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            config,
            connection: Mutex::new(Some(Connection::open(transport))),
        }
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Spawn the agent CLI and connect to it
    ///
    /// Transient spawn failures are retried up to
    /// `ClientConfig::start_attempts` times. Starting a running client is a
    /// no-op.
    pub async fn start(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if connection.as_ref().is_some_and(|c| c.is_open()) {
            return Ok(());
        }

        let process = self.config.process_config();
        tracing::info!(cli_path = %process.cli_path, "Starting agent CLI");
        let transport = retry_with_recovery(
            move || {
                let process = process.clone();
                async move { CliTransport::spawn(process).map_err(AgentError::from) }.boxed()
            },
            Some(self.config.start_attempts),
        )
        .await?;

        *connection = Some(Connection::open(Arc::new(transport)));
        Ok(())
    }

    /// Whether the client has a live connection
    pub async fn is_running(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.is_open())
    }

    /// Open a new session
    ///
    /// Fails with [`AgentError::Timeout`] if the agent does not confirm
    /// within `ClientConfig::request_timeout`, and with
    /// [`AgentError::RequestFailed`] if it refuses.
    pub async fn create_session(&self, config: SessionConfig) -> Result<AgentSession> {
        let connection = self
            .connection
            .lock()
            .await
            .clone()
            .filter(|c| c.is_open())
            .ok_or(AgentError::NotConnected)?;

        let (session_id, inbox) = connection
            .create_session(config.spec(), self.config.request_timeout)
            .await?;

        Ok(AgentSession::open(connection, session_id, inbox, config))
    }

    /// Close every session, tell the agent goodbye, and close the transport
    ///
    /// Pending `send_and_wait` calls resolve with
    /// [`AgentError::SessionClosed`]. Stopping a stopped client is a no-op.
    pub async fn stop(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            tracing::info!(sessions = connection.session_count(), "Stopping client");
            connection.shutdown().await;
        }
    }
}
