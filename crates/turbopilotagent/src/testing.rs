//! Testing utilities
//!
//! [`MockAgent`] plays the agent's side of an in-memory transport: it
//! answers `session.create`, runs a scripted sequence of events for each
//! prompt, asks for permission before every scripted tool call, and records
//! everything the client sends. No agent CLI process is needed.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use turbopilot_protocol::protocol::{from_value, to_value};
use turbopilot_protocol::{
    AgentMessage, ClientMessage, PermissionDecision, PermissionKind, PermissionRequest, RequestId,
    SessionEvent, SessionId, ToolError, ToolExecutionComplete, ToolExecutionProgress,
    ToolExecutionStart, ToolResult,
};
use turbopilot_transport::{AgentEndpoint, MemoryTransport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A tool call the mock agent performs after asking permission
#[derive(Debug, Clone)]
pub struct ToolScript {
    /// Permission kind requested
    pub kind: PermissionKind,
    /// Tool being invoked
    pub tool_name: String,
    /// Id shared by the call's events
    pub tool_call_id: String,
    /// Arguments reported in `ToolExecutionStart`
    pub arguments: Map<String, Value>,
    /// Progress messages emitted between start and completion
    pub progress: Vec<String>,
    /// Whether the call succeeds
    pub success: bool,
    /// Result content on success, error message on failure
    pub output: String,
}

impl ToolScript {
    /// Add an argument
    pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    /// Emit a progress message before completing
    pub fn with_progress(mut self, message: impl Into<String>) -> Self {
        self.progress.push(message.into());
        self
    }

    /// Request a different permission kind
    pub fn with_kind(mut self, kind: PermissionKind) -> Self {
        self.kind = kind;
        self
    }
}

/// One step of a prompt script
#[derive(Debug, Clone)]
pub enum Step {
    /// Emit a session event
    Emit(SessionEvent),
    /// Emit a raw event payload as-is
    EmitRaw(Value),
    /// Pause before the next step
    Sleep(Duration),
    /// Ask permission, then run the tool call if approved
    Tool(ToolScript),
}

impl Step {
    /// Emit `SessionInfo`
    pub fn info(message: impl Into<String>) -> Self {
        Step::Emit(SessionEvent::info(message))
    }

    /// Emit `SessionError`
    pub fn error(message: impl Into<String>) -> Self {
        Step::Emit(SessionEvent::error(message))
    }

    /// Emit `AssistantMessage`
    pub fn reply(content: impl Into<String>) -> Self {
        Step::Emit(SessionEvent::assistant(content))
    }

    /// Pause for a number of milliseconds
    pub fn sleep_ms(ms: u64) -> Self {
        Step::Sleep(Duration::from_millis(ms))
    }

    /// A successful tool call
    pub fn tool_call(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Step::Tool(Self::tool_script(tool_name, tool_call_id, true, output))
    }

    /// A failing tool call
    pub fn failing_tool_call(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Step::Tool(Self::tool_script(tool_name, tool_call_id, false, error))
    }

    /// A tool call described in full
    pub fn tool(script: ToolScript) -> Self {
        Step::Tool(script)
    }

    /// Start building a tool call
    pub fn tool_script(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        success: bool,
        output: impl Into<String>,
    ) -> ToolScript {
        ToolScript {
            kind: PermissionKind::Mcp,
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            arguments: Map::new(),
            progress: Vec::new(),
            success,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
enum CreateBehavior {
    #[default]
    Accept,
    Fail(String),
    Ignore,
}

/// Builder for [`MockAgent`]
#[derive(Debug, Default)]
pub struct MockAgentBuilder {
    scripts: HashMap<String, Vec<Step>>,
    default_script: Vec<Step>,
    create: CreateBehavior,
}

impl MockAgentBuilder {
    /// Script to run when exactly this prompt arrives
    pub fn on_prompt(mut self, prompt: impl Into<String>, steps: Vec<Step>) -> Self {
        self.scripts.insert(prompt.into(), steps);
        self
    }

    /// Script to run for prompts without their own script
    pub fn default_script(mut self, steps: Vec<Step>) -> Self {
        self.default_script = steps;
        self
    }

    /// Refuse every `session.create`
    pub fn fail_session_create(mut self, message: impl Into<String>) -> Self {
        self.create = CreateBehavior::Fail(message.into());
        self
    }

    /// Never answer `session.create`
    pub fn ignore_session_create(mut self) -> Self {
        self.create = CreateBehavior::Ignore;
        self
    }

    /// Start the agent; returns the client's end of the channel
    pub fn spawn(self) -> (MemoryTransport, MockAgent) {
        let (transport, endpoint) = MemoryTransport::pair();
        let agent = MockAgent {
            inner: Arc::new(Inner {
                endpoint,
                scripts: self.scripts,
                default_script: self.default_script,
                create: self.create,
                received: Mutex::new(Vec::new()),
                decisions: Mutex::new(Vec::new()),
                permissions: Mutex::new(HashMap::new()),
                next_session: AtomicU64::new(0),
            }),
        };
        tokio::spawn(Arc::clone(&agent.inner).serve());
        (transport, agent)
    }
}

struct Inner {
    endpoint: AgentEndpoint,
    scripts: HashMap<String, Vec<Step>>,
    default_script: Vec<Step>,
    create: CreateBehavior,
    received: Mutex<Vec<ClientMessage>>,
    decisions: Mutex<Vec<(String, PermissionDecision)>>,
    permissions: Mutex<HashMap<RequestId, oneshot::Sender<PermissionDecision>>>,
    next_session: AtomicU64,
}

/// Scripted agent behind a [`MemoryTransport`]
#[derive(Clone)]
pub struct MockAgent {
    inner: Arc<Inner>,
}

impl MockAgent {
    /// Start configuring a mock agent
    pub fn builder() -> MockAgentBuilder {
        MockAgentBuilder::default()
    }

    /// Every message the client sent, in order
    pub fn received(&self) -> Vec<ClientMessage> {
        lock(&self.inner.received).clone()
    }

    /// Prompts submitted through `session.send`
    pub fn prompts(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::Send { prompt, .. } => Some(prompt),
                _ => None,
            })
            .collect()
    }

    /// Sessions the client destroyed
    pub fn destroyed_sessions(&self) -> Vec<SessionId> {
        self.received()
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::DestroySession { session_id } => Some(session_id),
                _ => None,
            })
            .collect()
    }

    /// Whether `client.shutdown` arrived
    pub fn shutdown_received(&self) -> bool {
        self.received()
            .iter()
            .any(|message| matches!(message, ClientMessage::Shutdown))
    }

    /// Permission decisions received, by tool name
    pub fn permission_decisions(&self) -> Vec<(String, PermissionDecision)> {
        lock(&self.inner.decisions).clone()
    }

    /// Emit an event outside any script
    pub async fn emit(&self, session_id: &SessionId, event: SessionEvent) {
        self.inner.emit(session_id, event).await;
    }

    /// Emit a raw event payload outside any script
    pub async fn emit_raw(&self, session_id: &SessionId, event: Value) {
        self.inner
            .send(AgentMessage::Event {
                session_id: session_id.clone(),
                event,
            })
            .await;
    }

    /// Write an arbitrary line to the client
    pub async fn send_line(&self, value: Value) {
        if let Err(err) = self.inner.endpoint.send(value).await {
            tracing::debug!(error = %err, "Mock agent could not write");
        }
    }

    /// Close the agent's side of the channel
    pub async fn hang_up(&self) {
        self.inner.endpoint.close().await;
    }
}

impl Inner {
    async fn serve(self: Arc<Self>) {
        while let Some(value) = self.endpoint.recv().await {
            let message: ClientMessage = match from_value(value) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(error = %err, "Mock agent received an undecodable message");
                    continue;
                }
            };
            lock(&self.received).push(message.clone());

            match message {
                ClientMessage::CreateSession { request_id, .. } => {
                    self.on_create(request_id).await
                }
                ClientMessage::Send { session_id, prompt } => {
                    let steps = self
                        .scripts
                        .get(&prompt)
                        .unwrap_or(&self.default_script)
                        .clone();
                    tokio::spawn(Arc::clone(&self).run_script(session_id, steps));
                }
                ClientMessage::PermissionResponse {
                    request_id,
                    decision,
                    ..
                } => {
                    let waiter = lock(&self.permissions).remove(&request_id);
                    if let Some(waiter) = waiter {
                        let _ = waiter.send(decision);
                    }
                }
                ClientMessage::DestroySession { .. } | ClientMessage::Shutdown => {}
            }
        }
    }

    async fn on_create(&self, request_id: RequestId) {
        match &self.create {
            CreateBehavior::Accept => {
                let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
                self.send(AgentMessage::SessionCreated {
                    request_id,
                    session_id: SessionId::new(format!("session-{n}")),
                })
                .await;
            }
            CreateBehavior::Fail(message) => {
                self.send(AgentMessage::RequestFailed {
                    request_id,
                    message: message.clone(),
                })
                .await;
            }
            CreateBehavior::Ignore => {}
        }
    }

    async fn run_script(self: Arc<Self>, session_id: SessionId, steps: Vec<Step>) {
        for step in steps {
            match step {
                Step::Emit(event) => self.emit(&session_id, event).await,
                Step::EmitRaw(event) => {
                    self.send(AgentMessage::Event {
                        session_id: session_id.clone(),
                        event,
                    })
                    .await
                }
                Step::Sleep(delay) => tokio::time::sleep(delay).await,
                Step::Tool(tool) => self.run_tool(&session_id, tool).await,
            }
        }
    }

    async fn run_tool(&self, session_id: &SessionId, tool: ToolScript) {
        let request_id = RequestId::new();
        let (waiter, decision) = oneshot::channel();
        lock(&self.permissions).insert(request_id.clone(), waiter);
        self.send(AgentMessage::PermissionRequest {
            session_id: session_id.clone(),
            request_id,
            request: PermissionRequest::new(tool.kind, tool.tool_name.clone())
                .with_tool_call_id(tool.tool_call_id.clone()),
        })
        .await;

        let Ok(decision) = decision.await else {
            return;
        };
        lock(&self.decisions).push((tool.tool_name.clone(), decision.clone()));
        if !decision.is_approved() {
            return;
        }

        self.emit(
            session_id,
            SessionEvent::ToolExecutionStart(ToolExecutionStart {
                tool_name: tool.tool_name,
                tool_call_id: tool.tool_call_id.clone(),
                arguments: tool.arguments,
            }),
        )
        .await;
        for message in tool.progress {
            self.emit(
                session_id,
                SessionEvent::ToolExecutionProgress(ToolExecutionProgress {
                    tool_call_id: tool.tool_call_id.clone(),
                    progress_message: message,
                }),
            )
            .await;
        }
        let (result, error) = if tool.success {
            (Some(ToolResult { content: tool.output }), None)
        } else {
            (None, Some(ToolError { message: tool.output }))
        };
        self.emit(
            session_id,
            SessionEvent::ToolExecutionComplete(ToolExecutionComplete {
                tool_call_id: tool.tool_call_id,
                success: tool.success,
                result,
                error,
            }),
        )
        .await;
    }

    async fn emit(&self, session_id: &SessionId, event: SessionEvent) {
        match serde_json::to_value(&event) {
            Ok(event) => {
                self.send(AgentMessage::Event {
                    session_id: session_id.clone(),
                    event,
                })
                .await
            }
            Err(err) => tracing::warn!(error = %err, "Mock agent could not encode event"),
        }
    }

    async fn send(&self, message: AgentMessage) {
        let sent = match to_value(&message) {
            Ok(value) => self.endpoint.send(value).await.map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };
        if let Err(err) = sent {
            tracing::debug!(error = %err, "Mock agent could not write");
        }
    }
}
