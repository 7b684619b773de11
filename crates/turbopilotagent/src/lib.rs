//! Agent session SDK for TurboPilot
//!
//! Drives a tool-using agent CLI over a newline-delimited JSON channel. A
//! single [`AgentClient`] owns the channel and creates [`AgentSession`]s;
//! each session streams typed [`SessionEvent`]s to its subscribers, answers
//! the agent's permission requests through a [`PermissionGate`], and offers
//! [`AgentSession::send_and_wait`] for callers that only want the reply.
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use turbopilotagent::{AgentClient, ClientConfig, SessionConfig, SessionEvent};
//! use turbopilot_protocol::McpServerConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AgentClient::new(ClientConfig::from_env());
//! client.start().await?;
//!
//! let config = SessionConfig::new()
//!     .with_model("gpt-4.1")
//!     .with_mcp_server(
//!         "playwright",
//!         McpServerConfig::stdio("npx").with_arg("-y").with_arg("@playwright/mcp@latest"),
//!     )
//!     .approve_all();
//! let session = client.create_session(config).await?;
//!
//! session.subscribe(|event: &SessionEvent| println!("{:?}", event.kind()));
//! let reply = session
//!     .send_and_wait("Open example.com and read the title", Duration::from_secs(120))
//!     .await;
//!
//! session.destroy().await?;
//! client.stop().await;
//! println!("{reply:?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Delivery model
//!
//! One reader task demultiplexes the channel into per-session inboxes. Each
//! session's router task decodes events and queues them for every
//! subscriber; each subscriber runs on its own task, so a slow or panicking
//! handler never holds up the channel, the other subscribers, or a pending
//! `send_and_wait`. Permission requests are evaluated on separate tasks
//! under a bounded wait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod permissions;
pub mod retry;
pub mod session;
pub mod testing;

mod connection;
mod routing;

pub use client::AgentClient;
pub use config::{ClientConfig, SessionConfig};
pub use correlator::{CorrelatedRequest, ORPHAN_REPLY_GRACE};
pub use dispatch::{EventSubscriber, Subscription};
pub use error::{AgentError, BackoffStrategy, ErrorRecovery, Result};
pub use permissions::{
    ApproveAll, DenyAll, FallbackPolicy, FnGate, PermissionContext, PermissionEvaluator,
    PermissionGate,
};
pub use retry::retry_with_recovery;
pub use session::{AgentSession, SessionLifecycle, SessionState};

pub use turbopilot_protocol::{
    PermissionDecision, PermissionKind, PermissionRequest, SessionEvent, SessionId,
};
