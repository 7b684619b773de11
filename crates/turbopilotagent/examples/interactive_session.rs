//! Interactive Browser Session Example
//!
//! Opens a session backed by the Playwright tool server and forwards each
//! line typed at the prompt with `send_and_wait`.
//!
//! - `exit` / `quit` leave the loop
//! - `verbose` toggles tool detail
//! - blank lines are ignored
//!
//! The agent CLI is located through `TURBOPILOT_CLI_PATH` (default
//! `copilot`). Ctrl-C and end of input still destroy the session and stop
//! the client.
//!
//! Run with: cargo run --example interactive_session

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use turbopilot_protocol::McpServerConfig;
use turbopilotagent::{AgentClient, AgentSession, ClientConfig, SessionConfig, SessionEvent};

const REPLY_TIMEOUT: Duration = Duration::from_millis(120_000);

fn print_event(event: &SessionEvent, verbose: bool) {
    match event {
        SessionEvent::SessionInfo(info) => println!("\n[session info] {}", info.message),
        SessionEvent::SessionError(error) => println!("\n[session error] {}", error.message),
        SessionEvent::ToolExecutionStart(start) if verbose => println!(
            "\n[tool start] {} id={} args={:?}",
            start.tool_name, start.tool_call_id, start.arguments
        ),
        SessionEvent::ToolExecutionStart(start) => println!("\n[tool start] {}", start.tool_name),
        SessionEvent::ToolExecutionPartialResult(partial) if verbose => {
            println!("[tool partial] id={} {}", partial.tool_call_id, partial.partial_output)
        }
        SessionEvent::ToolExecutionProgress(progress) if verbose => {
            println!("[tool progress] id={} {}", progress.tool_call_id, progress.progress_message)
        }
        SessionEvent::ToolExecutionComplete(done) if verbose => println!(
            "[tool done] id={} success={}\n{}",
            done.tool_call_id,
            done.success,
            done.output()
        ),
        SessionEvent::ToolExecutionComplete(done) => {
            println!("[tool done] id={} success={}", done.tool_call_id, done.success)
        }
        SessionEvent::AssistantMessage(message) => println!("\n[assistant]\n{}", message.content),
        _ => {}
    }
}

/// Blocking stdin reads stay on their own thread
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn prompt_loop(session: &AgentSession, verbose: &AtomicBool) -> std::io::Result<()> {
    let mut input = stdin_lines();
    println!("Interactive mode started. Type 'exit' to quit or 'verbose' to toggle logs");

    loop {
        print!("\nCommand Agent > ");
        std::io::stdout().flush()?;
        let Some(line) = input.recv().await else {
            println!("\nExiting...");
            return Ok(());
        };
        let line = line.trim();

        match line.to_ascii_lowercase().as_str() {
            "exit" | "quit" => return Ok(()),
            "verbose" => {
                let now = !verbose.fetch_xor(true, Ordering::SeqCst);
                println!("verbose mode: {now}");
            }
            "" => {}
            _ => {
                let outcome = session.send_and_wait(line, REPLY_TIMEOUT).await;
                session.flush_events().await;
                if let Err(err) = outcome {
                    println!("[Execution Error]: {err}");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let client = AgentClient::new(ClientConfig::from_env());
    client.start().await?;

    let playwright = McpServerConfig::stdio("npx")
        .with_arg("-y")
        .with_arg("@playwright/mcp@latest");
    let config = SessionConfig::new()
        .with_model("gpt-4.1")
        .with_mcp_server("playwright", playwright)
        .with_system_message("You are a browser automation assistant. Do not use PowerShell.")
        .with_excluded_tool("powershell")
        .approve_all();

    let session = match client.create_session(config).await {
        Ok(session) => session,
        Err(err) => {
            client.stop().await;
            return Err(err.into());
        }
    };

    let verbose = Arc::new(AtomicBool::new(false));
    let detail = Arc::clone(&verbose);
    session.subscribe(move |event: &SessionEvent| {
        print_event(event, detail.load(Ordering::SeqCst))
    });

    let outcome = tokio::select! {
        result = prompt_loop(&session, &verbose) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nExiting...");
            Ok(())
        }
    };

    if let Err(err) = session.destroy().await {
        tracing::warn!(error = %err, "Session destroy failed");
    }
    client.stop().await;
    outcome?;
    Ok(())
}
