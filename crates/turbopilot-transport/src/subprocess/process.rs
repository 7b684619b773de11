//! Process management for the agent CLI subprocess

use crate::error::{Result, TransportError};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Configuration for spawning the agent CLI
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Path to the CLI executable
    pub cli_path: String,

    /// Arguments to pass to the CLI
    pub args: Vec<String>,

    /// Environment variables to set
    pub env: HashMap<String, String>,

    /// Start the child with an empty environment plus `env`
    pub clean_env: bool,

    /// Working directory for the child
    pub cwd: Option<std::path::PathBuf>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new("copilot")
    }
}

impl ProcessConfig {
    /// Create a new process configuration
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            args: vec!["--server".to_string(), "--stdio".to_string()],
            env: HashMap::new(),
            clean_env: false,
            cwd: None,
        }
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Do not inherit the parent's environment
    ///
    /// Only variables set via [`ProcessConfig::with_env`] reach the child.
    pub fn with_clean_env(mut self) -> Self {
        self.clean_env = true;
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<std::path::PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Handle to a running agent CLI process
///
/// Reader and writer halves are locked independently so a pending read never
/// blocks a write.
pub struct ProcessHandle {
    child: Mutex<Child>,
    stdin: Mutex<BufWriter<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    killed: AtomicBool,
    config: ProcessConfig,
}

impl ProcessHandle {
    /// Spawn a new CLI process
    pub fn spawn(config: ProcessConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.cli_path);
        cmd.args(&config.args);

        if config.clean_env {
            cmd.env_clear();
        }
        cmd.envs(&config.env);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::NotFound(config.cli_path.clone()),
            _ => TransportError::Process(format!("Failed to spawn {}: {}", config.cli_path, e)),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Process("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Process("Failed to get stdout".to_string()))?;

        // The CLI logs to stderr; surface it through tracing instead of a terminal
        if let Some(stderr) = child.stderr.take() {
            let cli = config.cli_path.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "turbopilot_transport::stderr", cli = %cli, "{}", line);
                }
            });
        }

        tracing::info!(cli = %config.cli_path, pid = child.id(), "Spawned agent CLI");

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(BufWriter::new(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            killed: AtomicBool::new(false),
            config,
        })
    }

    /// Send a JSON message to the process
    pub async fn send_message(&self, message: &Value) -> Result<()> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let json = serde_json::to_string(message)?;

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    /// Receive a JSON message from the process
    ///
    /// Blank lines are skipped. Returns `None` at EOF. A line that is not
    /// valid UTF-8 is consumed and reported as a serialization error, like
    /// any other undecodable line.
    pub async fn recv_message(&self) -> Result<Option<Value>> {
        let mut stdout = self.stdout.lock().await;
        loop {
            let mut raw = Vec::new();
            if stdout.read_until(b'\n', &mut raw).await? == 0 {
                return Ok(None);
            }
            let line = std::str::from_utf8(&raw)
                .map_err(|e| TransportError::Serialization(format!("Invalid UTF-8 from agent: {e}")))?
                .trim();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(line)?));
        }
    }

    /// Check if the process is still alive
    pub async fn is_alive(&self) -> bool {
        if self.killed.load(Ordering::SeqCst) {
            return false;
        }
        let mut child = self.child.lock().await;
        child.try_wait().ok().flatten().is_none()
    }

    /// Kill the process
    pub async fn kill(&self) -> Result<()> {
        if self.killed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut child = self.child.lock().await;
        if child.try_wait().ok().flatten().is_some() {
            return Ok(());
        }
        child
            .kill()
            .await
            .map_err(|e| TransportError::Process(format!("Failed to kill process: {}", e)))
    }

    /// Get the process configuration
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_config_default() {
        let config = ProcessConfig::default();
        assert_eq!(config.cli_path, "copilot");
        assert!(config.args.contains(&"--stdio".to_string()));
        assert!(!config.clean_env);
    }

    #[test]
    fn test_process_config_builder() {
        let config = ProcessConfig::new("/opt/copilot/bin/copilot")
            .with_arg("--log-level")
            .with_arg("debug")
            .with_env("COPILOT_TOKEN", "t-123")
            .with_clean_env()
            .with_cwd("/tmp");

        assert_eq!(config.cli_path, "/opt/copilot/bin/copilot");
        assert!(config.args.ends_with(&["--log-level".to_string(), "debug".to_string()]));
        assert_eq!(config.env.get("COPILOT_TOKEN"), Some(&"t-123".to_string()));
        assert!(config.clean_env);
        assert_eq!(config.cwd, Some(std::path::PathBuf::from("/tmp")));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let result = ProcessHandle::spawn(ProcessConfig::new("/nonexistent/turbopilot-agent"));
        assert!(matches!(result, Err(TransportError::NotFound(path)) if path == "/nonexistent/turbopilot-agent"));
    }
}
