//! Client and session configuration

use crate::permissions::{
    ApproveAll, DEFAULT_PERMISSION_TIMEOUT, DenyAll, FallbackPolicy, FnGate, PermissionContext,
    PermissionEvaluator, PermissionGate,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use turbopilot_protocol::{
    McpServerConfig, PermissionDecision, PermissionRequest, SessionSpec, SystemMessage,
};
use turbopilot_transport::ProcessConfig;

/// Default bound on control requests such as session creation
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of the client and the agent process it drives
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How to launch the agent CLI
    pub process: ProcessConfig,

    /// Log level forwarded to the agent CLI (`--log-level`)
    pub log_level: Option<String>,

    /// Bound on control requests (session creation)
    pub request_timeout: Duration,

    /// Spawn attempts made by `start()` before giving up
    pub start_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            process: ProcessConfig::default(),
            log_level: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            start_attempts: 3,
        }
    }
}

impl ClientConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from the environment
    ///
    /// Reads `TURBOPILOT_CLI_PATH`, `TURBOPILOT_LOG_LEVEL` and
    /// `TURBOPILOT_REQUEST_TIMEOUT_MS`; unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(cli_path) = lookup("TURBOPILOT_CLI_PATH") {
            config.process.cli_path = cli_path;
        }

        if let Some(level) = lookup("TURBOPILOT_LOG_LEVEL") {
            config.log_level = Some(level);
        }

        if let Some(timeout) = lookup("TURBOPILOT_REQUEST_TIMEOUT_MS")
            && let Ok(ms) = timeout.parse::<u64>()
        {
            config.request_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Path of the agent CLI executable
    pub fn with_cli_path(mut self, path: impl Into<String>) -> Self {
        self.process.cli_path = path.into();
        self
    }

    /// Extra argument passed to the agent CLI
    pub fn with_cli_arg(mut self, arg: impl Into<String>) -> Self {
        self.process = self.process.with_arg(arg);
        self
    }

    /// Environment variable set for the agent CLI
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.process = self.process.with_env(key, value);
        self
    }

    /// Log level forwarded to the agent CLI
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Bound on control requests
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Spawn attempts made by `start()`
    pub fn with_start_attempts(mut self, attempts: u32) -> Self {
        self.start_attempts = attempts.max(1);
        self
    }

    /// Final process configuration, log level included
    pub(crate) fn process_config(&self) -> ProcessConfig {
        match &self.log_level {
            Some(level) => self
                .process
                .clone()
                .with_arg("--log-level")
                .with_arg(level.clone()),
            None => self.process.clone(),
        }
    }
}

/// Configuration of a single session
#[derive(Clone)]
pub struct SessionConfig {
    /// Backing model identifier
    pub model: Option<String>,

    /// Tool servers by name
    pub mcp_servers: BTreeMap<String, McpServerConfig>,

    /// System instruction
    pub system_message: Option<String>,

    /// Tools disabled for this session
    pub excluded_tools: Vec<String>,

    /// Decides tool permission requests
    pub permission_gate: Arc<dyn PermissionGate>,

    /// Bound on a single gate decision
    pub permission_timeout: Duration,

    /// Decision applied when the gate times out or panics
    pub permission_fallback: FallbackPolicy,

    /// Whether a failed tool call ends a pending `send_and_wait`
    pub tool_failure_is_terminal: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: None,
            mcp_servers: BTreeMap::new(),
            system_message: None,
            excluded_tools: Vec::new(),
            permission_gate: Arc::new(DenyAll),
            permission_timeout: DEFAULT_PERMISSION_TIMEOUT,
            permission_fallback: FallbackPolicy::Deny,
            tool_failure_is_terminal: false,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("model", &self.model)
            .field("mcp_servers", &self.mcp_servers)
            .field("system_message", &self.system_message)
            .field("excluded_tools", &self.excluded_tools)
            .field("permission_timeout", &self.permission_timeout)
            .field("permission_fallback", &self.permission_fallback)
            .field("tool_failure_is_terminal", &self.tool_failure_is_terminal)
            .finish_non_exhaustive()
    }
}

impl SessionConfig {
    /// Create a default configuration (all tool use denied)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach a tool server
    pub fn with_mcp_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    /// Set the system instruction
    pub fn with_system_message(mut self, content: impl Into<String>) -> Self {
        self.system_message = Some(content.into());
        self
    }

    /// Disable a tool for this session
    pub fn with_excluded_tool(mut self, tool: impl Into<String>) -> Self {
        self.excluded_tools.push(tool.into());
        self
    }

    /// Use a gate for permission requests
    pub fn with_permission_gate(mut self, gate: impl PermissionGate + 'static) -> Self {
        self.permission_gate = Arc::new(gate);
        self
    }

    /// Approve every permission request
    pub fn approve_all(self) -> Self {
        self.with_permission_gate(ApproveAll)
    }

    /// Decide permission requests with a closure
    pub fn on_permission_request<F>(self, decide: F) -> Self
    where
        F: Fn(&PermissionRequest, &PermissionContext) -> PermissionDecision
            + Send
            + Sync
            + 'static,
    {
        self.with_permission_gate(FnGate::new(decide))
    }

    /// Bound on a single gate decision
    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout = timeout;
        self
    }

    /// Decision applied when the gate times out or panics
    pub fn with_permission_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.permission_fallback = fallback;
        self
    }

    /// Make failed tool calls end a pending `send_and_wait`
    pub fn with_tool_failure_terminal(mut self, terminal: bool) -> Self {
        self.tool_failure_is_terminal = terminal;
        self
    }

    /// The part of the configuration sent to the agent
    pub fn spec(&self) -> SessionSpec {
        SessionSpec {
            model: self.model.clone(),
            mcp_servers: self.mcp_servers.clone(),
            system_message: self
                .system_message
                .as_ref()
                .map(|content| SystemMessage {
                    content: content.clone(),
                }),
            excluded_tools: self.excluded_tools.clone(),
        }
    }

    pub(crate) fn evaluator(&self) -> PermissionEvaluator {
        PermissionEvaluator::new(self.permission_gate.clone())
            .with_excluded_tools(self.excluded_tools.iter().cloned())
            .with_timeout(self.permission_timeout)
            .with_fallback(self.permission_fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.process.cli_path, "copilot");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_from_env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("TURBOPILOT_CLI_PATH", "/opt/agent/bin/copilot"),
            ("TURBOPILOT_LOG_LEVEL", "debug"),
            ("TURBOPILOT_REQUEST_TIMEOUT_MS", "1500"),
        ]));

        assert_eq!(config.process.cli_path, "/opt/agent/bin/copilot");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_from_env_ignores_bad_timeout() {
        let config =
            ClientConfig::from_lookup(lookup(&[("TURBOPILOT_REQUEST_TIMEOUT_MS", "soon")]));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_log_level_forwarded_as_args() {
        let config = ClientConfig::new().with_log_level("info");
        let args = config.process_config().args;
        assert_eq!(&args[args.len() - 2..], ["--log-level", "info"]);
    }

    #[test]
    fn test_session_spec_projection() {
        let config = SessionConfig::new()
            .with_model("gpt-4.1")
            .with_system_message("You are terse.")
            .with_mcp_server(
                "playwright",
                McpServerConfig::stdio("npx").with_arg("-y").with_arg("@playwright/mcp@latest"),
            )
            .with_excluded_tool("powershell");

        let spec = config.spec();
        assert_eq!(spec.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(spec.system_message.as_ref().unwrap().content, "You are terse.");
        assert_eq!(spec.mcp_servers["playwright"].args.len(), 2);
        assert!(spec.is_excluded("powershell"));
    }

    #[test]
    fn test_session_debug_omits_gate() {
        let rendered = format!("{:?}", SessionConfig::new().approve_all());
        assert!(rendered.starts_with("SessionConfig"));
        assert!(!rendered.contains("permission_gate"));
    }
}
