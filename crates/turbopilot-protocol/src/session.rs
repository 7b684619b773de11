//! Session creation specification
//!
//! The serializable half of a session's configuration, sent to the agent with
//! `session.create`. Callbacks such as the permission gate live in the agent
//! crate and never cross the wire.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wildcard that enables every tool a server exposes
pub const ALL_TOOLS: &str = "*";

/// How the agent reaches a tool server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    /// Subprocess speaking over stdin/stdout
    #[default]
    Stdio,
    /// Remote server over HTTP
    Http,
}

fn all_tools() -> Vec<String> {
    vec![ALL_TOOLS.to_string()]
}

/// Tool server attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Transport kind
    #[serde(rename = "type", default)]
    pub transport: McpTransportKind,

    /// Launch command (stdio) or URL (http)
    pub command: String,

    /// Launch arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Enabled tool names, `*` for all
    #[serde(default = "all_tools")]
    pub tools: Vec<String>,

    /// Extra environment for the server process
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl McpServerConfig {
    /// Stdio server with every tool enabled
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            transport: McpTransportKind::Stdio,
            command: command.into(),
            args: Vec::new(),
            tools: all_tools(),
            env: BTreeMap::new(),
        }
    }

    /// Append a launch argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Restrict the enabled tools
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set an environment variable for the server process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Whether the server enables a given tool
    pub fn enables(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == ALL_TOOLS || t == tool)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(ProtocolError::InvalidSpec(format!(
                "tool server '{}' has an empty command",
                name
            )));
        }
        if self.tools.is_empty() {
            return Err(ProtocolError::InvalidSpec(format!(
                "tool server '{}' enables no tools",
                name
            )));
        }
        Ok(())
    }
}

/// Initial system-level instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Instruction text
    pub content: String,
}

/// Everything the agent needs to open a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSpec {
    /// Backing model identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool servers by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,

    /// System instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<SystemMessage>,

    /// Tools disabled regardless of server configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_tools: Vec<String>,
}

impl SessionSpec {
    /// Check the spec before it is sent
    pub fn validate(&self) -> Result<()> {
        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            return Err(ProtocolError::InvalidSpec("model is empty".into()));
        }
        for (name, server) in &self.mcp_servers {
            if name.trim().is_empty() {
                return Err(ProtocolError::InvalidSpec(
                    "tool server name is empty".into(),
                ));
            }
            server.validate(name)?;
        }
        Ok(())
    }

    /// Whether a tool is on the exclusion list
    pub fn is_excluded(&self, tool: &str) -> bool {
        self.excluded_tools.iter().any(|t| t == tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn playwright() -> McpServerConfig {
        McpServerConfig::stdio("npx")
            .with_arg("-y")
            .with_arg("@playwright/mcp@latest")
    }

    #[test]
    fn test_spec_wire_format() {
        let mut spec = SessionSpec {
            model: Some("gpt-4.1".into()),
            system_message: Some(SystemMessage {
                content: "You are a browser automation assistant".into(),
            }),
            excluded_tools: vec!["powershell".into()],
            ..Default::default()
        };
        spec.mcp_servers.insert("playwright".into(), playwright());

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4.1",
                "mcpServers": {
                    "playwright": {
                        "type": "stdio",
                        "command": "npx",
                        "args": ["-y", "@playwright/mcp@latest"],
                        "tools": ["*"]
                    }
                },
                "systemMessage": {"content": "You are a browser automation assistant"},
                "excludedTools": ["powershell"]
            })
        );
    }

    #[test]
    fn test_server_defaults_when_parsing() {
        let server: McpServerConfig = serde_json::from_value(json!({"command": "npx"})).unwrap();
        assert_eq!(server.transport, McpTransportKind::Stdio);
        assert_eq!(server.tools, vec!["*".to_string()]);
        assert!(server.enables("anything"));
    }

    #[test]
    fn test_enables_explicit_tools() {
        let server = playwright().with_tools(["browser_navigate"]);
        assert!(server.enables("browser_navigate"));
        assert!(!server.enables("browser_click"));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut spec = SessionSpec::default();
        spec.mcp_servers
            .insert("broken".into(), McpServerConfig::stdio("  "));
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let spec = SessionSpec {
            model: Some(String::new()),
            ..Default::default()
        };
        assert!(spec.validate().is_err());
        assert!(SessionSpec::default().validate().is_ok());
    }

    #[test]
    fn test_is_excluded() {
        let spec = SessionSpec {
            excluded_tools: vec!["powershell".into()],
            ..Default::default()
        };
        assert!(spec.is_excluded("powershell"));
        assert!(!spec.is_excluded("bash"));
    }
}
