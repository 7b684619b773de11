//! Prompt submission and correlated replies

use crate::correlator::CorrelatedRequest;
use crate::error::{AgentError, Result};
use crate::session::core::AgentSession;
use std::time::Duration;
use turbopilot_protocol::ClientMessage;

impl AgentSession {
    /// Submit a prompt without waiting for anything
    ///
    /// Returns once the channel accepted the prompt. Replies arrive as
    /// events.
    pub async fn send(&self, prompt: impl Into<String>) -> Result<()> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(AgentError::Config("prompt cannot be empty".to_string()));
        }
        if !self.is_active().await {
            return Err(AgentError::SessionClosed);
        }

        tracing::debug!(session_id = %self.id, prompt_len = prompt.len(), "Sending prompt");
        let message = ClientMessage::Send {
            session_id: self.id.clone(),
            prompt,
        };
        self.connection.send(&message).await.map_err(|err| match err {
            AgentError::NotConnected => AgentError::SessionClosed,
            other => other,
        })?;

        self.state.lock().await.record_prompt();
        Ok(())
    }

    /// Submit a prompt and wait for the assistant's reply
    ///
    /// Resolves with the content of the next `AssistantMessage`, fails with
    /// [`AgentError::SessionFailure`] on a `SessionError`, with
    /// [`AgentError::Timeout`] if neither arrives within `timeout`, and with
    /// [`AgentError::SessionClosed`] if the session goes away first. Only one
    /// call may be in flight per session; a concurrent one fails with
    /// [`AgentError::Busy`]. Timing out does not cancel work on the agent's
    /// side; a reply arriving later is dropped. The same holds when the
    /// returned future is dropped early, so the call is safe to race in
    /// `select!` or wrap in an outer timeout.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use turbopilotagent::{AgentClient, ClientConfig, SessionConfig};
    /// # use std::time::Duration;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = AgentClient::new(ClientConfig::from_env());
    /// client.start().await?;
    /// let session = client.create_session(SessionConfig::new().approve_all()).await?;
    ///
    /// let reply = session
    ///     .send_and_wait("What is in the current directory?", Duration::from_secs(120))
    ///     .await?;
    /// println!("{reply}");
    ///
    /// session.destroy().await?;
    /// client.stop().await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_and_wait(
        &self,
        prompt: impl Into<String>,
        timeout: Duration,
    ) -> Result<String> {
        let prompt = prompt.into();
        let (mut claim, reply) = self
            .correlator
            .register(CorrelatedRequest::new(prompt.clone(), timeout))?;

        self.send(prompt).await?;
        claim.submitted();

        match tokio::time::timeout(timeout, reply).await {
            Ok(outcome) => {
                claim.resolved();
                outcome.unwrap_or(Err(AgentError::SessionClosed))
            }
            Err(_) => {
                // Dropping the claim leaves the late reply to be discarded.
                drop(claim);
                tracing::debug!(session_id = %self.id, timeout_ms = timeout.as_millis() as u64, "Reply wait timed out");
                Err(AgentError::Timeout(timeout))
            }
        }
    }
}
