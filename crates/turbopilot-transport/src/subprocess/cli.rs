//! CLI transport implementation
//!
//! Bidirectional NDJSON communication with the agent CLI over stdin/stdout.

use crate::error::Result;
use crate::traits::AgentTransport;
use async_trait::async_trait;
use serde_json::Value;

pub use super::process::{ProcessConfig, ProcessHandle};

/// Transport backed by a spawned agent CLI process
pub struct CliTransport {
    process: ProcessHandle,
}

impl CliTransport {
    /// Spawn the CLI and wrap it as a transport
    pub fn spawn(config: ProcessConfig) -> Result<Self> {
        let process = ProcessHandle::spawn(config)?;
        Ok(Self { process })
    }

    /// Get process configuration
    pub fn config(&self) -> &ProcessConfig {
        self.process.config()
    }
}

#[async_trait]
impl AgentTransport for CliTransport {
    async fn send_message(&self, message: Value) -> Result<()> {
        self.process.send_message(&message).await
    }

    async fn recv_message(&self) -> Result<Option<Value>> {
        self.process.recv_message().await
    }

    async fn is_alive(&self) -> bool {
        self.process.is_alive().await
    }

    async fn close(&self) -> Result<()> {
        self.process.kill().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_through_cat() {
        let config = ProcessConfig {
            args: Vec::new(),
            ..ProcessConfig::new("cat")
        };
        let transport = CliTransport::spawn(config).unwrap();

        transport
            .send_message(json!({"type": "session.send", "prompt": "hi"}))
            .await
            .unwrap();
        let echoed = transport.recv_message().await.unwrap();
        assert_eq!(echoed, Some(json!({"type": "session.send", "prompt": "hi"})));

        assert!(transport.is_alive().await);
        transport.close().await.unwrap();
        assert!(!transport.is_alive().await);
        assert_eq!(transport.recv_message().await.unwrap(), None);
    }
}
