//! Agent sessions
//!
//! # Module Organization
//!
//! - [`state`] - lifecycle and counters
//! - [`core`] - the `AgentSession` struct, subscription and teardown
//! - [`query`] - `send` and `send_and_wait`
//!
//! # Examples
//!
//! Observing events while waiting for a reply:
//! ```no_run
//! # use turbopilotagent::{AgentClient, ClientConfig, SessionConfig};
//! # use turbopilot_protocol::SessionEvent;
//! # use std::time::Duration;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AgentClient::new(ClientConfig::default());
//! client.start().await?;
//! let session = client.create_session(SessionConfig::new().approve_all()).await?;
//!
//! let _tools = session.subscribe(|event: &SessionEvent| {
//!     if let SessionEvent::ToolExecutionStart(start) = event {
//!         println!("running {}", start.tool_name);
//!     }
//! });
//!
//! let reply = session.send_and_wait("list files", Duration::from_secs(60)).await?;
//! # let _ = reply;
//! session.destroy().await?;
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod query;
pub mod state;

pub use self::core::AgentSession;
pub use self::state::{SessionLifecycle, SessionState};
