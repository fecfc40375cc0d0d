// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch: wire commands in, reply envelopes out.
//!
//! Errors cross the boundary pre-classified: the engine's error kinds
//! map onto wire codes, and nothing here ever embeds raw subprocess
//! output or a credential value in a reply.

use jv_core::{CredentialStatus, HubEvent, IssueRef};
use jv_engine::{EngineError, IssueLifecycle, StartRunOptions};
use jv_wire::{ok, Command, IssueRow, ReconcileOutcome, Reply, Secret};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Shared server context for all connection handlers.
pub struct ServerCtx {
    pub lifecycle: Arc<IssueLifecycle>,
    pub start_time: Instant,
}

impl ServerCtx {
    pub fn new(lifecycle: Arc<IssueLifecycle>) -> Self {
        Self { lifecycle, start_time: Instant::now() }
    }

    fn credentials_dir(&self) -> PathBuf {
        self.lifecycle.layout().root().join("credentials")
    }
}

/// Handle one command. `Subscribe` is intercepted by the listener before
/// this is reached.
pub async fn handle_command(ctx: &ServerCtx, command: Command) -> Reply {
    match dispatch(ctx, command).await {
        Ok(reply) => reply,
        Err(e) => error_reply(e),
    }
}

fn error_reply(e: EngineError) -> Reply {
    if let EngineError::Validation { message, field_errors } = &e {
        if !field_errors.is_empty() {
            let fields: BTreeMap<String, String> = field_errors.iter().cloned().collect();
            return Reply::err_with_fields("VALIDATION", message.clone(), fields);
        }
    }
    Reply::err(e.code(), e.to_string())
}

fn parse_issue(raw: &str) -> Result<IssueRef, EngineError> {
    IssueRef::parse(raw).map_err(|e| EngineError::field("issue", &e.to_string()))
}

/// Resolve an optional issue argument against the active issue.
fn resolve_issue(ctx: &ServerCtx, issue: Option<&str>) -> Result<IssueRef, EngineError> {
    match issue {
        Some(raw) => parse_issue(raw),
        None => ctx
            .lifecycle
            .active()?
            .ok_or_else(|| EngineError::field("issue", "no issue given and none active")),
    }
}

async fn dispatch(ctx: &ServerCtx, command: Command) -> Result<Reply, EngineError> {
    match command {
        Command::Ping => Ok(ok(json!({"pong": true}))),

        Command::Status => {
            let issues = ctx.lifecycle.list_issues()?.len();
            Ok(ok(jv_wire::DaemonStatus {
                uptime_secs: ctx.start_time.elapsed().as_secs(),
                issues,
                subscribers: ctx.lifecycle.hub().subscriber_count(),
            }))
        }

        Command::ListIssues => {
            let issues: Vec<IssueRow> = ctx
                .lifecycle
                .list_issues()?
                .into_iter()
                .map(|summary| IssueRow {
                    issue: summary.issue_ref().to_string(),
                    issue_title: summary.issue_title,
                    branch: summary.branch,
                    phase: summary.phase,
                    workflow: summary.workflow,
                    updated_at_ms: summary.updated_at_ms,
                })
                .collect();
            Ok(ok(json!({"issues": issues})))
        }

        Command::SelectIssue { issue } => {
            let issue = parse_issue(&issue)?;
            ctx.lifecycle.select(&issue)?;
            Ok(ok(json!({"issue": issue.to_string()})))
        }

        Command::InitIssue { issue, workflow, branch, title } => {
            let issue = parse_issue(&issue)?;
            let state = ctx.lifecycle.init(&issue, &workflow, branch, title)?;
            Ok(ok(json!({"issue": issue.to_string(), "phase": state.phase})))
        }

        Command::StartRun { issue, provider, max_iterations, max_parallel_tasks } => {
            let issue = resolve_issue(ctx, issue.as_deref())?;
            let mut options = StartRunOptions { provider, ..Default::default() };
            if let Some(max) = max_iterations {
                options.max_iterations = max;
            }
            if let Some(max) = max_parallel_tasks {
                options.max_parallel_tasks = max;
            }
            let status = ctx.lifecycle.start_run(&issue, options)?;
            Ok(ok(json!({"run": status})))
        }

        Command::StopRun { issue, force } => {
            let issue = resolve_issue(ctx, issue.as_deref())?;
            let stopped = ctx.lifecycle.stop_run(&issue, force);
            Ok(ok(json!({"stopped": stopped})))
        }

        Command::SetPhase { issue, phase } => {
            let issue = resolve_issue(ctx, issue.as_deref())?;
            let state = ctx.lifecycle.set_phase(&issue, &phase)?;
            Ok(ok(json!({"issue": issue.to_string(), "phase": state.phase})))
        }

        Command::ExpandIssueSummary { issue, title } => {
            let issue = parse_issue(&issue)?;
            let state = ctx.lifecycle.expand_issue_summary(&issue, &title)?;
            Ok(ok(json!({"issue": issue.to_string(), "issue_title": state.issue_title})))
        }

        Command::UpsertProjectFile { issue, display_name, target_path, content, replace } => {
            let issue = parse_issue(&issue)?;
            let record = ctx.lifecycle.project_files(&issue).upsert(
                &display_name,
                &target_path,
                content.as_bytes(),
                replace,
            )?;
            Ok(ok(json!({"file": file_row(&record)})))
        }

        Command::DeleteProjectFile { issue, id } => {
            let issue = parse_issue(&issue)?;
            let removed = ctx.lifecycle.project_files(&issue).delete(id)?;
            Ok(ok(json!({"file": file_row(&removed)})))
        }

        Command::ReconcileProjectFiles { issue } => {
            let issue = parse_issue(&issue)?;
            let report = ctx.lifecycle.reconcile_project_files(&issue)?;
            Ok(ok(ReconcileOutcome {
                sync_status: report.sync_status.to_string(),
                last_error: report.last_error,
            }))
        }

        Command::PutCredentials { provider, token } => {
            if provider.trim().is_empty() {
                return Err(EngineError::field("provider", "must not be empty"));
            }
            if token.is_empty() {
                return Err(EngineError::field("token", "must not be empty"));
            }
            let status = put_credentials(ctx, &provider, token)?;
            ctx.lifecycle.hub().broadcast(&HubEvent::CredentialsStatus(status.clone()));
            Ok(ok(json!({"credentials": status})))
        }

        Command::DeleteCredentials { provider } => {
            let status = delete_credentials(ctx, &provider)?;
            ctx.lifecycle.hub().broadcast(&HubEvent::CredentialsStatus(status.clone()));
            Ok(ok(json!({"credentials": status})))
        }

        // Intercepted by the listener; reaching here is a client error.
        Command::Subscribe => {
            Err(EngineError::validation("subscribe is only valid as a connection upgrade"))
        }
    }
}

fn file_row(record: &jv_engine::ManagedFile) -> jv_wire::FileRow {
    jv_wire::FileRow {
        id: record.id,
        display_name: record.display_name.clone(),
        target_path: record.target_path.clone(),
        size_bytes: record.size_bytes,
        sha256: record.sha256.clone(),
        updated_at_ms: record.updated_at_ms,
    }
}

/// Write the secret (0600) and its safe status record. The token value
/// exists only on this call path and is consumed by the file writer.
fn put_credentials(
    ctx: &ServerCtx,
    provider: &str,
    token: Secret,
) -> Result<CredentialStatus, EngineError> {
    let dir = ctx.credentials_dir();
    jv_store::atomic::write_secret_atomic(&dir.join(format!("{provider}.token")), &token.reveal())?;

    let status = CredentialStatus {
        provider: provider.to_string(),
        has_token: true,
        last_saved_at_ms: Some(now_ms()),
        last_used_at_ms: None,
    };
    jv_store::atomic::write_json_atomic(&dir.join(format!("{provider}.status.json")), &status)?;
    tracing::info!(provider, "credentials stored");
    Ok(status)
}

fn delete_credentials(ctx: &ServerCtx, provider: &str) -> Result<CredentialStatus, EngineError> {
    let dir = ctx.credentials_dir();
    let _ = std::fs::remove_file(dir.join(format!("{provider}.token")));

    let status = CredentialStatus {
        provider: provider.to_string(),
        has_token: false,
        last_saved_at_ms: None,
        last_used_at_ms: None,
    };
    jv_store::atomic::write_json_atomic(&dir.join(format!("{provider}.status.json")), &status)?;
    tracing::info!(provider, "credentials deleted");
    Ok(status)
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
