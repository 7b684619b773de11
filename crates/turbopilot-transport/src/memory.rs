//! In-process transport pair
//!
//! [`MemoryTransport::pair`] returns the client half of a channel together
//! with an [`AgentEndpoint`] that plays the agent's side. Useful for embedding
//! an agent in the same process and for driving sessions in tests.

use crate::error::{Result, TransportError};
use crate::traits::AgentTransport;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};

/// Client half of an in-memory channel
pub struct MemoryTransport {
    to_agent: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    from_agent: Mutex<mpsc::UnboundedReceiver<Value>>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

/// Agent half of an in-memory channel
pub struct AgentEndpoint {
    to_client: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    from_client: Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl MemoryTransport {
    /// Create a connected transport / endpoint pair
    pub fn pair() -> (MemoryTransport, AgentEndpoint) {
        let (to_agent, from_client) = mpsc::unbounded_channel();
        let (to_client, from_agent) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let transport = MemoryTransport {
            to_agent: Mutex::new(Some(to_agent)),
            from_agent: Mutex::new(from_agent),
            closed_tx,
            closed_rx,
        };
        let endpoint = AgentEndpoint {
            to_client: Mutex::new(Some(to_client)),
            from_client: Mutex::new(from_client),
        };
        (transport, endpoint)
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

#[async_trait]
impl AgentTransport for MemoryTransport {
    async fn send_message(&self, message: Value) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let sender = self.to_agent.lock().await;
        match sender.as_ref() {
            Some(tx) => tx
                .send(message)
                .map_err(|_| TransportError::Connection("agent endpoint dropped".to_string())),
            None => Err(TransportError::Closed),
        }
    }

    async fn recv_message(&self) -> Result<Option<Value>> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut closed = self.closed_rx.clone();
        let mut receiver = self.from_agent.lock().await;
        tokio::select! {
            message = receiver.recv() => Ok(message),
            _ = async {
                let _ = closed.wait_for(|closed| *closed).await;
            } => Ok(None),
        }
    }

    async fn is_alive(&self) -> bool {
        !self.is_closed() && self.to_agent.lock().await.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    async fn close(&self) -> Result<()> {
        self.closed_tx.send_replace(true);
        self.to_agent.lock().await.take();
        Ok(())
    }
}

impl AgentEndpoint {
    /// Send a message to the client
    pub async fn send(&self, message: Value) -> Result<()> {
        let sender = self.to_client.lock().await;
        match sender.as_ref() {
            Some(tx) => tx
                .send(message)
                .map_err(|_| TransportError::Connection("client transport dropped".to_string())),
            None => Err(TransportError::Closed),
        }
    }

    /// Receive the next message from the client, `None` once it closed
    pub async fn recv(&self) -> Option<Value> {
        self.from_client.lock().await.recv().await
    }

    /// Hang up: the client sees end-of-stream after draining queued messages
    pub async fn close(&self) {
        self.to_client.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (transport, agent) = MemoryTransport::pair();

        transport.send_message(json!({"n": 1})).await.unwrap();
        assert_eq!(agent.recv().await, Some(json!({"n": 1})));

        agent.send(json!({"n": 2})).await.unwrap();
        assert_eq!(transport.recv_message().await.unwrap(), Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_close_wakes_pending_recv() {
        let (transport, _agent) = MemoryTransport::pair();
        let transport = std::sync::Arc::new(transport);

        let reader = {
            let transport = std::sync::Arc::clone(&transport);
            tokio::spawn(async move { transport.recv_message().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        transport.close().await.unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), reader)
            .await
            .expect("recv should wake on close")
            .unwrap();
        assert_eq!(result.unwrap(), None);
        assert!(!transport.is_alive().await);
        assert!(matches!(
            transport.send_message(json!({})).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_agent_close_ends_stream_after_drain() {
        let (transport, agent) = MemoryTransport::pair();
        agent.send(json!("last")).await.unwrap();
        agent.close().await;

        assert_eq!(transport.recv_message().await.unwrap(), Some(json!("last")));
        assert_eq!(transport.recv_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_client_close_ends_agent_stream() {
        let (transport, agent) = MemoryTransport::pair();
        transport.close().await.unwrap();
        assert_eq!(agent.recv().await, None);
    }
}
