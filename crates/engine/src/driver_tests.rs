// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg(unix)]

use super::*;
use crate::lifecycle::IssueLifecycle;
use jv_core::{TaskBuilder, TaskList};
use jv_store::{Layout, Store};
use serde_json::json;
use std::time::Duration;

const PROVIDER_ENV: &str = "JEEVES_FAKEPROV_BIN";

/// Install a fake provider: a shell script that swallows stdin and emits
/// the given protocol lines.
fn install_provider(dir: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fakeprov");
    std::fs::write(&path, format!("#!/bin/sh\ncat > /dev/null\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::env::set_var(PROVIDER_ENV, &path);
}

fn fixture(workflow_yaml: &str) -> (tempfile::TempDir, Arc<IssueLifecycle>) {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path());
    let store = Arc::new(Store::open(dir.path()).unwrap());
    let lifecycle = IssueLifecycle::new(layout, store);
    lifecycle.put_workflow(workflow_yaml).unwrap();
    (dir, lifecycle)
}

fn issue() -> IssueRef {
    IssueRef::new("acme", "widgets", 7)
}

/// Wait until the active run settles or the budget runs out.
async fn wait_for_run_end(lifecycle: &Arc<IssueLifecycle>) {
    for _ in 0..200 {
        if lifecycle.run_status(&issue()).is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run did not settle in time");
}

fn collect_terminal_runs(lifecycle: &Arc<IssueLifecycle>) -> Arc<parking_lot::Mutex<Vec<RunStatus>>> {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    lifecycle.hub().add_subscriber(Box::new(move |event| {
        if let HubEvent::Run(status) = event {
            if !status.running {
                sink.lock().push(status.clone());
            }
        }
        Ok(())
    }));
    seen
}

#[tokio::test]
#[serial_test::serial]
async fn script_phase_advances_on_status_mapping() {
    let (_dir, lifecycle) = fixture(
        r#"
name: script-flow
start: build
phases:
  build:
    type: script
    command: "true"
    status_mapping:
      success: buildClean
    transitions:
      - to: done
        when: status.buildClean == true
  done:
    type: terminal
"#,
    );
    lifecycle.init(&issue(), "script-flow", None, None).unwrap();

    let terminal = collect_terminal_runs(&lifecycle);
    let status = lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap();
    assert!(status.running);
    wait_for_run_end(&lifecycle).await;

    let state = lifecycle.read_state(&issue()).unwrap().unwrap();
    assert_eq!(state.phase, "done");
    assert_eq!(state.status.get("buildClean"), Some(&json!(true)));

    let terminal = terminal.lock();
    let last = terminal.last().unwrap();
    assert_eq!(last.completion_reason.as_deref(), Some("workflow terminal"));
    assert!(last.completed_via_state);
}

#[tokio::test]
#[serial_test::serial]
async fn provider_phase_runs_and_maps_result_fields() {
    let (dir, lifecycle) = fixture(
        r#"
name: provider-flow
start: review
phases:
  review:
    type: evaluate
    provider: fakeprov
    prompt: "Review ${issue}"
    status_mapping:
      reviewClean: reviewClean
    transitions:
      - to: done
        when: status.reviewClean == true
  done:
    type: terminal
"#,
    );
    install_provider(
        dir.path(),
        r#"echo '{"type":"system","session_id":"sess-7"}'
echo '{"type":"assistant","content":"looks clean"}'
echo '{"type":"result","success":true,"reviewClean":true}'"#,
    );
    lifecycle.init(&issue(), "provider-flow", None, None).unwrap();

    let terminal = collect_terminal_runs(&lifecycle);
    lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap();
    wait_for_run_end(&lifecycle).await;
    std::env::remove_var(PROVIDER_ENV);

    let state = lifecycle.read_state(&issue()).unwrap().unwrap();
    assert_eq!(state.phase, "done");

    let terminal = terminal.lock();
    let last = terminal.last().unwrap();
    assert!(last.completed_via_promise);
    assert!(last.completed_via_state);

    // The run artifact landed in the run dir with the provider session.
    let state_dir = lifecycle.state_dir(&issue());
    let artifact = state_dir.join("runs/run-000001/output.json");
    let doc: crate::output::SdkDocument =
        serde_json::from_str(&std::fs::read_to_string(artifact).unwrap()).unwrap();
    assert_eq!(doc.schema, crate::output::SDK_SCHEMA);
    assert_eq!(doc.session_id, "sess-7");
    assert!(doc.success);
}

#[tokio::test]
#[serial_test::serial]
async fn failed_provider_ends_the_run() {
    let (dir, lifecycle) = fixture(
        r#"
name: failing-flow
start: work
phases:
  work:
    type: execute
    provider: fakeprov
    prompt: "Work"
    transitions:
      - to: done
        when: status.lastRunSucceeded == true
  done:
    type: terminal
"#,
    );
    install_provider(dir.path(), "exit 2");
    lifecycle.init(&issue(), "failing-flow", None, None).unwrap();

    let terminal = collect_terminal_runs(&lifecycle);
    lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap();
    wait_for_run_end(&lifecycle).await;
    std::env::remove_var(PROVIDER_ENV);

    let state = lifecycle.read_state(&issue()).unwrap().unwrap();
    assert_eq!(state.phase, "work");

    let terminal = terminal.lock();
    let last = terminal.last().unwrap();
    assert_eq!(last.completion_reason.as_deref(), Some("failed (exit 2)"));
    assert_eq!(last.returncode, Some(2));
}

#[tokio::test]
#[serial_test::serial]
async fn second_start_conflicts_while_first_runs() {
    let (dir, lifecycle) = fixture(
        r#"
name: slow-flow
start: work
phases:
  work:
    type: execute
    provider: fakeprov
    prompt: "Work"
  done:
    type: terminal
"#,
    );
    install_provider(dir.path(), "sleep 5");
    lifecycle.init(&issue(), "slow-flow", None, None).unwrap();

    lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap();
    let err = lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap_err();
    assert_eq!(err.code(), "RUN_ALREADY_ACTIVE");

    assert!(lifecycle.stop_run(&issue(), false));
    wait_for_run_end(&lifecycle).await;
    std::env::remove_var(PROVIDER_ENV);
}

#[tokio::test]
#[serial_test::serial]
async fn stop_run_cancels_and_is_idempotent() {
    let (dir, lifecycle) = fixture(
        r#"
name: slow-flow
start: work
phases:
  work:
    type: execute
    provider: fakeprov
    prompt: "Work"
  done:
    type: terminal
"#,
    );
    install_provider(dir.path(), "sleep 30");
    lifecycle.init(&issue(), "slow-flow", None, None).unwrap();

    let terminal = collect_terminal_runs(&lifecycle);
    lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(lifecycle.stop_run(&issue(), false));
    wait_for_run_end(&lifecycle).await;
    assert!(!lifecycle.stop_run(&issue(), false));
    std::env::remove_var(PROVIDER_ENV);

    let terminal = terminal.lock();
    assert_eq!(terminal.last().unwrap().completion_reason.as_deref(), Some("cancelled"));
}

#[tokio::test]
#[serial_test::serial]
async fn parallel_wave_runs_ready_tasks_and_clears_bookkeeping() {
    let (dir, lifecycle) = fixture(
        r#"
name: wave-flow
start: execute-tasks
phases:
  execute-tasks:
    type: execute
    provider: fakeprov
    prompt: "Do the assigned task"
    transitions:
      - to: done
        when: status.tasksComplete == true
  done:
    type: terminal
"#,
    );
    install_provider(dir.path(), r#"echo '{"type":"result","success":true}'"#);
    lifecycle.init(&issue(), "wave-flow", None, None).unwrap();

    let state_dir = lifecycle.state_dir(&issue());
    let tasks = TaskList::new(vec![
        TaskBuilder::default().id("alpha").build(),
        TaskBuilder::default().id("beta").build(),
    ]);
    lifecycle.store().write_tasks(&state_dir, &tasks).unwrap();

    lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap();
    wait_for_run_end(&lifecycle).await;
    std::env::remove_var(PROVIDER_ENV);

    let tasks = lifecycle.store().read_tasks(&state_dir).unwrap().unwrap();
    assert!(tasks.tasks.iter().all(|t| t.status == jv_core::TaskStatus::Passed));

    let state = lifecycle.read_state(&issue()).unwrap().unwrap();
    assert_eq!(state.phase, "done");
    assert_eq!(state.parallel_run_id(), None, "wave bookkeeping should be cleared");

    // Worker artifacts live under the wave's run id.
    let workers = state_dir.join("runs/run-000001/workers");
    assert!(workers.join("alpha/output.json").exists());
    assert!(workers.join("beta/output.json").exists());
}

#[tokio::test]
#[serial_test::serial]
async fn interrupted_wave_resumes_under_original_run_id() {
    let (dir, lifecycle) = fixture(
        r#"
name: wave-flow
start: execute-tasks
phases:
  execute-tasks:
    type: execute
    provider: fakeprov
    prompt: "Do the assigned task"
    transitions:
      - to: done
        when: status.tasksComplete == true
  done:
    type: terminal
"#,
    );
    install_provider(dir.path(), r#"echo '{"type":"result","success":true}'"#);
    lifecycle.init(&issue(), "wave-flow", None, None).unwrap();

    let state_dir = lifecycle.state_dir(&issue());
    lifecycle
        .store()
        .write_tasks(
            &state_dir,
            &TaskList::new(vec![TaskBuilder::default().id("alpha").build()]),
        )
        .unwrap();

    // Simulate a previously-interrupted wave: parallel.runId survives.
    let mut state = lifecycle.read_state(&issue()).unwrap().unwrap();
    state.set_parallel_run_id("run-000040");
    lifecycle.store().write_issue(&state_dir, &issue(), &state).unwrap();

    lifecycle.start_run(&issue(), StartRunOptions::default()).unwrap();
    wait_for_run_end(&lifecycle).await;
    std::env::remove_var(PROVIDER_ENV);

    // Artifacts went to the original wave id, not this run's own id.
    assert!(state_dir.join("runs/run-000040/workers/alpha/output.json").exists());
}

#[test]
fn derive_status_patch_prefers_output_file_over_result() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("verdict.json"), json!({"clean": false}).to_string()).unwrap();

    let phase: Phase = serde_json::from_value(json!({
        "type": "evaluate",
        "prompt": "p",
        "output_file": "verdict.json",
        "status_mapping": {"clean": "reviewClean", "success": "lastRunSucceeded"}
    }))
    .unwrap();

    let mut result_extra = Map::new();
    result_extra.insert("clean".to_string(), json!(true));

    let patch = derive_status_patch(&phase, Some(&result_extra), dir.path(), true);
    assert_eq!(patch.get("reviewClean"), Some(&json!(false)));
    assert_eq!(patch.get("lastRunSucceeded"), Some(&json!(true)));
}

#[test]
fn derive_status_patch_supports_dotted_targets() {
    let phase: Phase = serde_json::from_value(json!({
        "type": "execute",
        "prompt": "p",
        "status_mapping": {"wave": "parallel.runId"}
    }))
    .unwrap();

    let mut result_extra = Map::new();
    result_extra.insert("wave".to_string(), json!("run-000009"));

    let dir = tempfile::tempdir().unwrap();
    let patch = derive_status_patch(&phase, Some(&result_extra), dir.path(), true);
    assert_eq!(patch["parallel"]["runId"], json!("run-000009"));
}

#[test]
fn derive_status_patch_without_mapping_sets_success_flag() {
    let phase: Phase =
        serde_json::from_value(json!({"type": "execute", "prompt": "p"})).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let patch = derive_status_patch(&phase, None, dir.path(), false);
    assert_eq!(patch.get("lastRunSucceeded"), Some(&json!(false)));
}
