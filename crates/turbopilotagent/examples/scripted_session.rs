//! Scripted Session Example
//!
//! Runs the session API against the in-process mock agent, so no agent CLI
//! is needed. One task consumes the event stream while the main task blocks
//! on `send_and_wait`.
//!
//! Run with: cargo run --example scripted_session

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use turbopilotagent::testing::{MockAgent, Step};
use turbopilotagent::{AgentClient, ClientConfig, SessionConfig, SessionEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    // Step 1: An agent that lists files when asked
    let (transport, agent) = MockAgent::builder()
        .on_prompt(
            "list files",
            vec![
                Step::info("indexing workspace"),
                Step::tool(
                    Step::tool_script("list_files", "1", true, "a.txt,b.txt")
                        .with_progress("reading directory"),
                ),
                Step::reply("Found 2 files"),
            ],
        )
        .spawn();
    let client = AgentClient::with_transport(ClientConfig::default(), Arc::new(transport));

    // Step 2: Approve only read-only tools
    let session = client
        .create_session(SessionConfig::new().on_permission_request(|request, _| {
            if request.tool_name.starts_with("list") || request.tool_name.starts_with("read") {
                turbopilotagent::PermissionDecision::Approved
            } else {
                turbopilotagent::PermissionDecision::denied("read-only session")
            }
        }))
        .await?;

    // Step 3: Watch the stream on its own task
    let mut events = session.event_stream();
    let watcher = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match &event {
                SessionEvent::ToolExecutionComplete(done) => {
                    println!("{} {} -> {}", event.kind(), done.tool_call_id, done.output())
                }
                other => println!("{}", other.kind()),
            }
        }
    });

    // Step 4: Block on the reply
    let reply = session
        .send_and_wait("list files", Duration::from_secs(5))
        .await?;
    println!("\nReply: {reply}");

    let state = session.state().await;
    println!(
        "Prompts sent: {}, events received: {}",
        state.prompts_sent, state.events_received
    );
    println!("Permission decisions: {:?}", agent.permission_decisions());

    // Step 5: Tear down; the stream ends with the session
    session.destroy().await?;
    client.stop().await;
    watcher.await?;
    Ok(())
}
