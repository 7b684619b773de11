//! Integration tests for event subscription and fan-out

mod common;

use common::{WAIT, kinds, list_files_script, open_session, recorder};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use turbopilot_protocol::ToolCallLedger;
use turbopilotagent::testing::{MockAgent, Step};
use turbopilotagent::{SessionConfig, SessionEvent};

fn tool_event(kind: &str, id: &str) -> Step {
    let data = match kind {
        "tool.execution_start" => json!({"toolName": "browser_snapshot", "toolCallId": id}),
        "tool.execution_progress" => json!({"toolCallId": id, "progressMessage": "rendering"}),
        "tool.execution_partial_result" => json!({"toolCallId": id, "partialOutput": "<div>"}),
        _ => json!({"toolCallId": id, "success": true, "result": {"content": "ok"}}),
    };
    Step::EmitRaw(json!({"type": kind, "data": data}))
}

#[tokio::test]
async fn test_fan_out_to_every_subscriber() {
    let builder = MockAgent::builder().on_prompt("list files", list_files_script());
    let (_harness, session) = open_session(builder, SessionConfig::new().approve_all()).await;
    let (first, first_sub) = recorder();
    let (second, second_sub) = recorder();
    session.subscribe(first_sub);
    session.subscribe(second_sub);

    session.send_and_wait("list files", WAIT).await.unwrap();
    session.flush_events().await;

    assert_eq!(kinds(&first).len(), 3);
    assert_eq!(*first.lock().unwrap(), *second.lock().unwrap());
}

#[tokio::test]
async fn test_panicking_subscriber_is_isolated() {
    let builder = MockAgent::builder().on_prompt("list files", list_files_script());
    let (_harness, session) = open_session(builder, SessionConfig::new().approve_all()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    session.subscribe(move |_: &SessionEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("subscriber bug");
    });
    let (events, subscriber) = recorder();
    session.subscribe(subscriber);

    let reply = session.send_and_wait("list files", WAIT).await;

    assert_eq!(reply, Ok("Found 2 files".to_string()));
    session.flush_events().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(kinds(&events).len(), 3);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let builder = MockAgent::builder().default_script(vec![Step::reply("hi")]);
    let (_harness, session) = open_session(builder, SessionConfig::new()).await;
    let (events, subscriber) = recorder();
    let subscription = session.subscribe(subscriber);

    session.send_and_wait("one", WAIT).await.unwrap();
    session.flush_events().await;
    subscription.unsubscribe();
    session.send_and_wait("two", WAIT).await.unwrap();
    session.flush_events().await;

    assert_eq!(kinds(&events), vec!["assistant.message"]);
    assert_eq!(session.subscriber_count(), 0);
}

#[tokio::test]
async fn test_event_stream_ends_on_destroy() {
    let builder = MockAgent::builder().on_prompt("list files", list_files_script());
    let (_harness, session) = open_session(builder, SessionConfig::new().approve_all()).await;
    let stream = session.event_stream();

    session.send_and_wait("list files", WAIT).await.unwrap();
    session.destroy().await.unwrap();

    let collected: Vec<SessionEvent> = stream.collect().await;
    assert_eq!(collected.len(), 3);
    assert_eq!(collected[2], SessionEvent::assistant("Found 2 files"));
}

#[tokio::test]
async fn test_event_stream_polled_in_place() {
    let builder = MockAgent::builder().on_prompt("list files", list_files_script());
    let (_harness, session) = open_session(builder, SessionConfig::new().approve_all()).await;
    let mut events = session.event_stream();

    session.send_and_wait("list files", WAIT).await.unwrap();

    let first = events.next().await.unwrap();
    assert_eq!(first.kind().as_str(), "tool.execution_start");
    let mut rest = Vec::new();
    while rest.len() < 2 {
        rest.push(events.next().await.unwrap());
    }
    assert_eq!(rest[1], SessionEvent::assistant("Found 2 files"));
}

#[tokio::test]
async fn test_per_tool_call_order_is_preserved() {
    // Two interleaved tool calls; each keeps Start -> updates -> Complete.
    let builder = MockAgent::builder().default_script(vec![
        tool_event("tool.execution_start", "a"),
        tool_event("tool.execution_start", "b"),
        tool_event("tool.execution_progress", "a"),
        tool_event("tool.execution_partial_result", "b"),
        tool_event("tool.execution_complete", "b"),
        tool_event("tool.execution_partial_result", "a"),
        tool_event("tool.execution_complete", "a"),
        Step::reply("snapshots taken"),
    ]);
    let (_harness, session) = open_session(builder, SessionConfig::new()).await;
    let (events, subscriber) = recorder();
    session.subscribe(subscriber);

    session.send_and_wait("snapshot both", WAIT).await.unwrap();
    session.flush_events().await;

    let events = events.lock().unwrap();
    let mut ledger = ToolCallLedger::new();
    for event in events.iter() {
        ledger.observe(event).expect("per-call order must hold");
    }
    assert!(ledger.running().is_empty());

    let order: Vec<(&str, Option<&str>)> = events
        .iter()
        .map(|event| (event.kind().as_str(), event.tool_call_id()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("tool.execution_start", Some("a")),
            ("tool.execution_start", Some("b")),
            ("tool.execution_progress", Some("a")),
            ("tool.execution_partial_result", Some("b")),
            ("tool.execution_complete", Some("b")),
            ("tool.execution_partial_result", Some("a")),
            ("tool.execution_complete", Some("a")),
            ("assistant.message", None),
        ]
    );
}

#[tokio::test]
async fn test_sessions_do_not_see_each_others_events() {
    let builder = MockAgent::builder()
        .on_prompt("ping", vec![Step::reply("pong")])
        .on_prompt("marco", vec![Step::reply("polo")]);
    let harness = common::connect(builder);
    let first = harness.client.create_session(SessionConfig::new()).await.unwrap();
    let second = harness.client.create_session(SessionConfig::new()).await.unwrap();
    let (first_events, first_sub) = recorder();
    first.subscribe(first_sub);

    let (a, b) = tokio::join!(
        first.send_and_wait("ping", WAIT),
        second.send_and_wait("marco", WAIT)
    );

    assert_eq!(a, Ok("pong".to_string()));
    assert_eq!(b, Ok("polo".to_string()));
    first.flush_events().await;
    assert_eq!(
        *first_events.lock().unwrap(),
        vec![SessionEvent::assistant("pong")]
    );
}
