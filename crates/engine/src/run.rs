// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run manager: the one-active-run invariant, run ids, run status, the
//! viewer log, and terminal `run` broadcasts.

use crate::error::EngineError;
use crate::hub::EventHub;
use jv_core::{HubEvent, IssueRef, LogLines, RunStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Live run bookkeeping shared between the manager and its guard.
struct ActiveRun {
    run_id: String,
    status: Arc<Mutex<RunStatus>>,
    cancel: CancellationToken,
}

type ActiveMap = Arc<Mutex<HashMap<String, ActiveRun>>>;

/// Owns the at-most-one-running-run-per-issue invariant for a data dir.
pub struct RunManager {
    hub: Arc<EventHub>,
    active: ActiveMap,
}

impl RunManager {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub, active: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Begin a run for an issue. The check-and-insert under one lock is
    /// the critical section that preserves the invariant: a second
    /// `begin` for the same issue fails with `RUN_ALREADY_ACTIVE` until
    /// the first guard finishes.
    pub fn begin(
        &self,
        issue: &IssueRef,
        state_dir: &Path,
        command: String,
        max_iterations: u32,
        max_parallel_tasks: Option<usize>,
    ) -> Result<RunGuard, EngineError> {
        let key = issue.to_string();
        let mut active = self.active.lock();
        if active.contains_key(&key) {
            return Err(EngineError::conflict(
                "RUN_ALREADY_ACTIVE",
                format!("a run is already active for {issue}"),
            ));
        }

        let run_id = next_run_id(state_dir)?;
        let run_dir = state_dir.join("runs").join(&run_id);
        std::fs::create_dir_all(&run_dir)?;
        let viewer_log_file = run_dir.join("viewer.log");

        let status = Arc::new(Mutex::new(RunStatus {
            running: true,
            started_at: Some(now_rfc3339()),
            command,
            max_iterations,
            issue_ref: key.clone(),
            viewer_log_file: Some(viewer_log_file.clone()),
            max_parallel_tasks,
            ..Default::default()
        }));
        let cancel = CancellationToken::new();

        active.insert(
            key.clone(),
            ActiveRun {
                run_id: run_id.clone(),
                status: Arc::clone(&status),
                cancel: cancel.clone(),
            },
        );
        drop(active);

        tracing::info!(issue = %issue, run_id, "run started");
        self.hub.broadcast(&HubEvent::Run(status.lock().clone()));

        Ok(RunGuard {
            active: Arc::clone(&self.active),
            hub: Arc::clone(&self.hub),
            issue_key: key,
            run_id,
            run_dir,
            viewer_log_file,
            status,
            cancel,
            finished: false,
        })
    }

    /// Status of the active run, if any.
    pub fn status(&self, issue: &IssueRef) -> Option<RunStatus> {
        self.active.lock().get(&issue.to_string()).map(|run| run.status.lock().clone())
    }

    /// Signal the active run to stop. Idempotent: stopping an idle issue
    /// reports `false`.
    ///
    /// The supervisor walks SIGTERM → grace → force kill either way;
    /// `force` is accepted for callers that want to record intent.
    pub fn stop(&self, issue: &IssueRef, force: bool) -> bool {
        let active = self.active.lock();
        match active.get(&issue.to_string()) {
            Some(run) => {
                tracing::info!(issue = %issue, run_id = %run.run_id, force, "run stop requested");
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Handle to a begun run. The driver updates status through it and must
/// call [`RunGuard::finish`]; dropping an unfinished guard releases the
/// slot and records an internal failure.
pub struct RunGuard {
    active: ActiveMap,
    hub: Arc<EventHub>,
    issue_key: String,
    run_id: String,
    run_dir: PathBuf,
    viewer_log_file: PathBuf,
    status: Arc<Mutex<RunStatus>>,
    cancel: CancellationToken,
    finished: bool,
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard")
            .field("issue_key", &self.issue_key)
            .field("run_id", &self.run_id)
            .field("run_dir", &self.run_dir)
            .field("viewer_log_file", &self.viewer_log_file)
            .field("finished", &self.finished)
            .finish()
    }
}

impl RunGuard {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.status.lock().clone()
    }

    /// Mutate run status and broadcast the updated `run` event.
    pub fn update<F: FnOnce(&mut RunStatus)>(&self, mutate: F) {
        let snapshot = {
            let mut status = self.status.lock();
            mutate(&mut status);
            status.clone()
        };
        self.hub.broadcast(&HubEvent::Run(snapshot));
    }

    /// Append a line to the viewer log and broadcast it.
    pub fn viewer_log(&self, line: &str) {
        let appended = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.viewer_log_file)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = appended {
            tracing::warn!(error = %e, "viewer log append failed");
        }
        self.hub.broadcast(&HubEvent::ViewerLogs(LogLines {
            lines: vec![line.to_string()],
            reset: false,
        }));
    }

    /// Settle the run: stamp the terminal fields, release the active
    /// slot, and broadcast the terminal `run` event.
    pub fn finish(
        mut self,
        returncode: Option<i32>,
        completion_reason: &str,
        last_error: Option<String>,
    ) {
        let snapshot = {
            let mut status = self.status.lock();
            status.running = false;
            status.ended_at = Some(now_rfc3339());
            status.returncode = returncode;
            status.completion_reason = Some(completion_reason.to_string());
            status.last_error = last_error;
            status.clone()
        };
        tracing::info!(issue = %self.issue_key, run_id = %self.run_id, completion_reason, "run finished");
        self.finished = true;
        self.active.lock().remove(&self.issue_key);
        self.hub.broadcast(&HubEvent::Run(snapshot));
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            let snapshot = {
                let mut status = self.status.lock();
                status.running = false;
                status.ended_at = Some(now_rfc3339());
                status.completion_reason = Some("driver dropped".to_string());
                status.last_error = Some("run driver ended without finishing".to_string());
                status.clone()
            };
            tracing::error!(issue = %self.issue_key, run_id = %self.run_id, "run guard dropped unfinished");
            self.active.lock().remove(&self.issue_key);
            self.hub.broadcast(&HubEvent::Run(snapshot));
        }
    }
}

/// Assign the next monotonic run id for a state dir by scanning existing
/// run directories.
fn next_run_id(state_dir: &Path) -> Result<String, EngineError> {
    let runs_dir = state_dir.join("runs");
    let mut highest = 0u64;
    if let Ok(entries) = std::fs::read_dir(&runs_dir) {
        for entry in entries.flatten() {
            if let Some(n) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("run-"))
                .and_then(|suffix| suffix.parse::<u64>().ok())
            {
                highest = highest.max(n);
            }
        }
    }
    Ok(format!("run-{:06}", highest + 1))
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
