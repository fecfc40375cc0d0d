// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jv_store::{Layout, Store};
use serde_json::Value;

const WORKFLOW_YAML: &str = r#"
name: issue-flow
start: plan
phases:
  plan:
    type: execute
    provider: fakeprov
    prompt: "Plan"
    transitions:
      - to: done
        when: status.planReady == true
  done:
    type: terminal
"#;

fn fixture() -> (tempfile::TempDir, ServerCtx) {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path());
    let store = Arc::new(Store::open(dir.path()).unwrap());
    let lifecycle = IssueLifecycle::new(layout, store);
    lifecycle.put_workflow(WORKFLOW_YAML).unwrap();
    (dir, ServerCtx::new(lifecycle))
}

fn to_value(reply: &Reply) -> Value {
    serde_json::to_value(reply).unwrap()
}

#[tokio::test]
async fn ping_pongs() {
    let (_dir, ctx) = fixture();
    let value = to_value(&handle_command(&ctx, Command::Ping).await);
    assert_eq!(value["ok"], true);
    assert_eq!(value["pong"], true);
}

#[tokio::test]
async fn init_select_and_list() {
    let (_dir, ctx) = fixture();

    let reply = handle_command(
        &ctx,
        Command::InitIssue {
            issue: "acme/widgets#7".to_string(),
            workflow: "issue-flow".to_string(),
            branch: None,
            title: Some("Fix the widget".to_string()),
        },
    )
    .await;
    let value = to_value(&reply);
    assert_eq!(value["ok"], true);
    assert_eq!(value["phase"], "plan");

    let reply =
        handle_command(&ctx, Command::SelectIssue { issue: "acme/widgets#7".to_string() }).await;
    assert!(reply.is_ok());

    let value = to_value(&handle_command(&ctx, Command::ListIssues).await);
    assert_eq!(value["issues"].as_array().unwrap().len(), 1);
    assert_eq!(value["issues"][0]["issue"], "acme/widgets#7");
    assert_eq!(value["issues"][0]["issue_title"], "Fix the widget");
}

#[tokio::test]
async fn malformed_issue_ref_reports_field_errors() {
    let (_dir, ctx) = fixture();
    let value = to_value(
        &handle_command(&ctx, Command::SelectIssue { issue: "not-a-ref".to_string() }).await,
    );
    assert_eq!(value["ok"], false);
    assert_eq!(value["code"], "VALIDATION");
    assert!(value["field_errors"]["issue"].is_string());
}

#[tokio::test]
async fn unknown_issue_is_not_found() {
    let (_dir, ctx) = fixture();
    let value = to_value(
        &handle_command(&ctx, Command::SelectIssue { issue: "a/b#1".to_string() }).await,
    );
    assert_eq!(value["ok"], false);
    assert_eq!(value["code"], "NOT_FOUND");
}

#[tokio::test]
async fn start_run_without_issue_or_active_fails_validation() {
    let (_dir, ctx) = fixture();
    let value = to_value(
        &handle_command(
            &ctx,
            Command::StartRun {
                issue: None,
                provider: None,
                max_iterations: None,
                max_parallel_tasks: None,
            },
        )
        .await,
    );
    assert_eq!(value["ok"], false);
    assert_eq!(value["code"], "VALIDATION");
}

#[tokio::test]
async fn set_phase_uses_active_issue() {
    let (_dir, ctx) = fixture();
    handle_command(
        &ctx,
        Command::InitIssue {
            issue: "acme/widgets#7".to_string(),
            workflow: "issue-flow".to_string(),
            branch: None,
            title: None,
        },
    )
    .await;
    handle_command(&ctx, Command::SelectIssue { issue: "acme/widgets#7".to_string() }).await;

    let value = to_value(
        &handle_command(&ctx, Command::SetPhase { issue: None, phase: "done".to_string() }).await,
    );
    assert_eq!(value["ok"], true);
    assert_eq!(value["phase"], "done");
}

#[tokio::test]
async fn stop_run_is_idempotent_when_idle() {
    let (_dir, ctx) = fixture();
    handle_command(
        &ctx,
        Command::InitIssue {
            issue: "acme/widgets#7".to_string(),
            workflow: "issue-flow".to_string(),
            branch: None,
            title: None,
        },
    )
    .await;

    let value = to_value(
        &handle_command(
            &ctx,
            Command::StopRun { issue: Some("acme/widgets#7".to_string()), force: false },
        )
        .await,
    );
    assert_eq!(value["ok"], true);
    assert_eq!(value["stopped"], false);
}

#[tokio::test]
async fn project_file_surface_round_trips() {
    let (_dir, ctx) = fixture();
    let issue = "acme/widgets#7".to_string();

    let value = to_value(
        &handle_command(
            &ctx,
            Command::UpsertProjectFile {
                issue: issue.clone(),
                display_name: "Connection config".to_string(),
                target_path: "secrets/conn.cfg".to_string(),
                content: "token=abc".to_string(),
                replace: false,
            },
        )
        .await,
    );
    assert_eq!(value["ok"], true);
    assert_eq!(value["file"]["id"], 1);

    // Same target again without replace: conflict.
    let value = to_value(
        &handle_command(
            &ctx,
            Command::UpsertProjectFile {
                issue: issue.clone(),
                display_name: "dup".to_string(),
                target_path: "secrets/conn.cfg".to_string(),
                content: "other".to_string(),
                replace: false,
            },
        )
        .await,
    );
    assert_eq!(value["code"], "TARGET_PATH_EXISTS");

    // Worktree absent: reconcile defers rather than failing.
    let value =
        to_value(&handle_command(&ctx, Command::ReconcileProjectFiles { issue: issue.clone() }).await);
    assert_eq!(value["ok"], true);
    assert_eq!(value["sync_status"], "deferred_worktree_absent");

    let value = to_value(
        &handle_command(&ctx, Command::DeleteProjectFile { issue, id: 1 }).await,
    );
    assert_eq!(value["ok"], true);
}

#[tokio::test]
async fn credentials_never_echo_the_secret() {
    let (dir, ctx) = fixture();

    let value = to_value(
        &handle_command(
            &ctx,
            Command::PutCredentials {
                provider: "claude".to_string(),
                token: jv_wire::Secret::new("sk-super-secret"),
            },
        )
        .await,
    );
    assert_eq!(value["ok"], true);
    assert_eq!(value["credentials"]["has_token"], true);
    assert!(!value.to_string().contains("sk-super-secret"));

    // The secret landed on disk, owner-only.
    let token_path = dir.path().join("credentials/claude.token");
    assert_eq!(std::fs::read_to_string(&token_path).unwrap(), "sk-super-secret");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&token_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let value = to_value(
        &handle_command(&ctx, Command::DeleteCredentials { provider: "claude".to_string() }).await,
    );
    assert_eq!(value["credentials"]["has_token"], false);
    assert!(!token_path.exists());
}

#[tokio::test]
async fn credentials_status_event_is_broadcast_without_secret() {
    let (_dir, ctx) = fixture();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    ctx.lifecycle.hub().add_subscriber(Box::new(move |event| {
        sink.lock().push(serde_json::to_string(event).map_err(|_| ())?);
        Ok(())
    }));

    handle_command(
        &ctx,
        Command::PutCredentials {
            provider: "claude".to_string(),
            token: jv_wire::Secret::new("sk-super-secret"),
        },
    )
    .await;

    let events = seen.lock();
    assert_eq!(events.len(), 1);
    assert!(events[0].contains("credentials-status"));
    assert!(!events[0].contains("sk-super-secret"));
}
