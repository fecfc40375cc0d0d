// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg(unix)]

use super::*;
use crate::protocol;
use jv_engine::IssueLifecycle;
use jv_store::{Layout, Store};
use serde_json::Value;
use tokio::net::UnixStream;

const WORKFLOW_YAML: &str = r#"
name: issue-flow
start: plan
phases:
  plan:
    type: execute
    provider: fakeprov
    prompt: "Plan"
  done:
    type: terminal
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    socket: std::path::PathBuf,
    ctx: Arc<ServerCtx>,
}

async fn start_server() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path());
    let store = Arc::new(Store::open(dir.path()).unwrap());
    let lifecycle = IssueLifecycle::new(layout, store);
    lifecycle.put_workflow(WORKFLOW_YAML).unwrap();

    let socket = dir.path().join("jvd.sock");
    let unix = tokio::net::UnixListener::bind(&socket).unwrap();
    let ctx = Arc::new(ServerCtx::new(lifecycle));
    tokio::spawn(Listener::new(unix, Arc::clone(&ctx)).run());

    Fixture { _dir: dir, socket, ctx }
}

async fn round_trip(socket: &std::path::Path, command: Command) -> Value {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    protocol::write_command(&mut stream, &command, IO_TIMEOUT).await.unwrap();
    let reply = protocol::read_reply(&mut stream, IO_TIMEOUT).await.unwrap();
    serde_json::to_value(&reply).unwrap()
}

#[tokio::test]
async fn ping_over_the_socket() {
    let fixture = start_server().await;
    let value = round_trip(&fixture.socket, Command::Ping).await;
    assert_eq!(value["ok"], true);
    assert_eq!(value["pong"], true);
}

#[tokio::test]
async fn init_then_list_over_the_socket() {
    let fixture = start_server().await;

    let value = round_trip(
        &fixture.socket,
        Command::InitIssue {
            issue: "acme/widgets#3".to_string(),
            workflow: "issue-flow".to_string(),
            branch: None,
            title: None,
        },
    )
    .await;
    assert_eq!(value["ok"], true);

    let value = round_trip(&fixture.socket, Command::ListIssues).await;
    assert_eq!(value["issues"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn errors_travel_as_envelopes() {
    let fixture = start_server().await;
    let value =
        round_trip(&fixture.socket, Command::SelectIssue { issue: "bogus".to_string() }).await;
    assert_eq!(value["ok"], false);
    assert_eq!(value["code"], "VALIDATION");
}

#[tokio::test]
async fn subscriber_receives_broadcast_events() {
    let fixture = start_server().await;

    let mut stream = UnixStream::connect(&fixture.socket).await.unwrap();
    protocol::write_command(&mut stream, &Command::Subscribe, IO_TIMEOUT).await.unwrap();
    let ack = protocol::read_reply(&mut stream, IO_TIMEOUT).await.unwrap();
    assert!(ack.is_ok());

    // Mutations on another connection fan out to the subscriber.
    round_trip(
        &fixture.socket,
        Command::InitIssue {
            issue: "acme/widgets#3".to_string(),
            workflow: "issue-flow".to_string(),
            branch: None,
            title: None,
        },
    )
    .await;

    let frame = protocol::read_raw_frame(&mut stream, IO_TIMEOUT).await.unwrap();
    let event: Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(event["event"], "state");
    assert_eq!(event["data"]["issue_json"]["phase"], "plan");
}

#[tokio::test]
async fn disconnected_subscriber_is_removed_and_others_still_deliver() {
    let fixture = start_server().await;

    // First subscriber connects then drops.
    let mut dropped = UnixStream::connect(&fixture.socket).await.unwrap();
    protocol::write_command(&mut dropped, &Command::Subscribe, IO_TIMEOUT).await.unwrap();
    protocol::read_reply(&mut dropped, IO_TIMEOUT).await.unwrap();
    drop(dropped);

    // Second subscriber stays.
    let mut kept = UnixStream::connect(&fixture.socket).await.unwrap();
    protocol::write_command(&mut kept, &Command::Subscribe, IO_TIMEOUT).await.unwrap();
    protocol::read_reply(&mut kept, IO_TIMEOUT).await.unwrap();

    // Give the listener a moment to notice the disconnect.
    for _ in 0..100 {
        if fixture.ctx.lifecycle.hub().subscriber_count() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(fixture.ctx.lifecycle.hub().subscriber_count(), 1);

    round_trip(
        &fixture.socket,
        Command::InitIssue {
            issue: "acme/widgets#3".to_string(),
            workflow: "issue-flow".to_string(),
            branch: None,
            title: None,
        },
    )
    .await;

    let frame = protocol::read_raw_frame(&mut kept, IO_TIMEOUT).await.unwrap();
    let event: Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(event["event"], "state");
}
