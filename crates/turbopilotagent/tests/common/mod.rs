//! Shared fixtures for the agent integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use turbopilotagent::testing::{MockAgent, MockAgentBuilder, Step};
use turbopilotagent::{AgentClient, AgentSession, ClientConfig, SessionConfig, SessionEvent};

pub const WAIT: Duration = Duration::from_secs(5);

/// A client wired to a scripted agent
pub struct Harness {
    pub client: AgentClient,
    pub agent: MockAgent,
}

pub fn connect(builder: MockAgentBuilder) -> Harness {
    connect_with(builder, ClientConfig::default())
}

pub fn connect_with(builder: MockAgentBuilder, config: ClientConfig) -> Harness {
    let (transport, agent) = builder.spawn();
    let client = AgentClient::with_transport(config, Arc::new(transport));
    Harness { client, agent }
}

pub async fn open_session(builder: MockAgentBuilder, config: SessionConfig) -> (Harness, AgentSession) {
    let harness = connect(builder);
    let session = harness
        .client
        .create_session(config)
        .await
        .expect("session should be created");
    (harness, session)
}

/// The "list files" exchange: one tool call, then the reply
pub fn list_files_script() -> Vec<Step> {
    vec![
        Step::tool_call("list_files", "1", "a.txt,b.txt"),
        Step::reply("Found 2 files"),
    ]
}

/// Subscriber that records every event
pub fn recorder() -> (Arc<Mutex<Vec<SessionEvent>>>, impl Fn(&SessionEvent) + Send + Sync + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event: &SessionEvent| {
        sink.lock().unwrap().push(event.clone())
    })
}

pub fn kinds(events: &Mutex<Vec<SessionEvent>>) -> Vec<&'static str> {
    events
        .lock()
        .unwrap()
        .iter()
        .map(|event| event.kind().as_str())
        .collect()
}

/// Poll a condition until it holds or about a second has passed
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
