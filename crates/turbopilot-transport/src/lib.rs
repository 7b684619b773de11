//! Duplex channel abstraction for TurboPilot
//!
//! The agent SDK treats the agent process as an opaque channel of JSON
//! messages. This crate defines that channel ([`AgentTransport`]) and ships two
//! implementations.
//!
//! # Architecture
//!
//! - **Transport trait**: [`traits::AgentTransport`], send / receive / close
//! - **Subprocess transport**: the agent CLI over stdin/stdout NDJSON
//! - **Memory transport**: an in-process pair for embedding and tests
//! - **Error handling**: [`TransportError`]
//!
//! # Usage
//!
//! ```ignore
//! use turbopilot_transport::{AgentTransport, CliTransport, ProcessConfig};
//!
//! let transport = CliTransport::spawn(ProcessConfig::new("copilot"))?;
//! transport.send_message(serde_json::json!({"type": "client.shutdown"})).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod subprocess;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{AgentEndpoint, MemoryTransport};
pub use subprocess::{CliTransport, ProcessConfig};
pub use traits::AgentTransport;
