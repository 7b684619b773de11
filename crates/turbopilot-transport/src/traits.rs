//! Transport trait
//!
//! The agent process is reached through an opaque duplex channel of JSON
//! messages. Framing and process management belong to the implementation.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Duplex JSON message channel to an agent process
///
/// `send_message` and `recv_message` may be called concurrently from
/// different tasks; implementations must not serialize one behind the other.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Write one message; returns once the channel has accepted it
    async fn send_message(&self, message: Value) -> Result<()>;

    /// Read the next message, `None` once the channel is closed
    async fn recv_message(&self) -> Result<Option<Value>>;

    /// Whether the channel is still usable
    async fn is_alive(&self) -> bool;

    /// Close the channel and release the underlying resources
    ///
    /// Pending and later `recv_message` calls return `Ok(None)`.
    async fn close(&self) -> Result<()>;
}
