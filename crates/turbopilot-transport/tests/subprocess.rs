//! Integration tests for the agent CLI subprocess transport

#![cfg(unix)]

use serde_json::json;
use tempfile::TempDir;
use turbopilot_transport::{AgentTransport, CliTransport, ProcessConfig, TransportError};

/// A stand-in agent written as a shell script
fn agent_script(script: &str) -> ProcessConfig {
    ProcessConfig {
        args: vec!["-c".to_string(), script.to_string()],
        ..ProcessConfig::new("/bin/sh")
    }
}

#[tokio::test]
async fn test_child_runs_in_configured_directory() {
    let dir = TempDir::new().unwrap();
    let config = agent_script(r#"printf '{"cwd":"%s"}\n' "$(pwd -P)""#).with_cwd(dir.path());

    let transport = CliTransport::spawn(config).unwrap();
    let message = transport.recv_message().await.unwrap().unwrap();

    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(message["cwd"], expected.to_str().unwrap());
}

#[tokio::test]
async fn test_clean_env_passes_only_configured_variables() {
    let config = agent_script(r#"printf '{"token":"%s","home":"%s"}\n' "$AGENT_TOKEN" "$HOME""#)
        .with_clean_env()
        .with_env("AGENT_TOKEN", "t-123");

    let transport = CliTransport::spawn(config).unwrap();
    let message = transport.recv_message().await.unwrap().unwrap();

    assert_eq!(message, json!({"token": "t-123", "home": ""}));
}

#[tokio::test]
async fn test_blank_lines_skipped_and_eof_is_none() {
    let transport = CliTransport::spawn(agent_script(r#"printf '\n  \n{"type":"ready"}\n'"#)).unwrap();

    assert_eq!(
        transport.recv_message().await.unwrap(),
        Some(json!({"type": "ready"}))
    );
    assert_eq!(transport.recv_message().await.unwrap(), None);
}

#[tokio::test]
async fn test_undecodable_line_does_not_end_stream() {
    let transport =
        CliTransport::spawn(agent_script(r#"printf 'not json\n{"type":"ready"}\n'"#)).unwrap();

    assert!(matches!(
        transport.recv_message().await,
        Err(TransportError::Serialization(_))
    ));
    assert_eq!(
        transport.recv_message().await.unwrap(),
        Some(json!({"type": "ready"}))
    );
}

#[tokio::test]
async fn test_invalid_utf8_line_does_not_end_stream() {
    let transport =
        CliTransport::spawn(agent_script(r#"printf '\377\376\n{"type":"ready"}\n'"#)).unwrap();

    assert!(matches!(
        transport.recv_message().await,
        Err(TransportError::Serialization(reason)) if reason.contains("UTF-8")
    ));
    assert_eq!(
        transport.recv_message().await.unwrap(),
        Some(json!({"type": "ready"}))
    );
}

#[tokio::test]
async fn test_missing_cli_is_not_found() {
    let result = CliTransport::spawn(ProcessConfig::new("/nonexistent/turbopilot-agent-cli"));

    assert!(matches!(result, Err(TransportError::NotFound(_))));
}

#[tokio::test]
async fn test_send_after_close_is_rejected() {
    let transport = CliTransport::spawn(agent_script("cat")).unwrap();

    transport.close().await.unwrap();

    assert!(!transport.is_alive().await);
    assert!(matches!(
        transport.send_message(json!({"type": "client.shutdown"})).await,
        Err(TransportError::Closed)
    ));
}
