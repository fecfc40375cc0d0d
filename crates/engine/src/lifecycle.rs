// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-issue lifecycle core: select/init/advance/reflect, glued to
//! the store, the workflow engine, the run manager, and the hub.

use crate::driver;
use crate::error::EngineError;
use crate::files::ProjectFiles;
use crate::hub::EventHub;
use crate::reconcile::{reconcile, ReconcileInputs, ReconcileReport, SyncStatus};
use crate::reflect::{self, ReflectInputs, Reflection};
use crate::run::RunManager;
use jv_core::{HubEvent, IssuePaths, IssueRef, IssueSnapshot, IssueState, MemoryScope, RunStatus};
use jv_store::{IssueSummary, Layout, Store};
use jv_workflow::{advance, AdvanceOutcome, Workflow};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default provider invocations per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Options for `start_run`.
#[derive(Debug, Clone)]
pub struct StartRunOptions {
    /// Overrides the phase's declared provider.
    pub provider: Option<String>,
    pub max_iterations: u32,
    pub max_parallel_tasks: usize,
    pub inactivity_timeout: Option<Duration>,
    pub iteration_timeout: Option<Duration>,
}

impl Default for StartRunOptions {
    fn default() -> Self {
        Self {
            provider: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_parallel_tasks: 2,
            inactivity_timeout: None,
            iteration_timeout: None,
        }
    }
}

pub struct IssueLifecycle {
    layout: Layout,
    store: Arc<Store>,
    hub: Arc<EventHub>,
    runs: Arc<RunManager>,
    /// Back-reference so run drivers can outlive the calling scope.
    self_ref: std::sync::Weak<IssueLifecycle>,
}

impl IssueLifecycle {
    pub fn new(layout: Layout, store: Arc<Store>) -> Arc<Self> {
        let hub = Arc::new(EventHub::new());
        let runs = Arc::new(RunManager::new(Arc::clone(&hub)));
        Arc::new_cyclic(|self_ref| Self {
            layout,
            store,
            hub,
            runs,
            self_ref: self_ref.clone(),
        })
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub(crate) fn runs(&self) -> &Arc<RunManager> {
        &self.runs
    }

    /// Load workflow documents from the filesystem mirror when the store
    /// has none yet. The mirror is the source of truth only here.
    pub fn ensure_workflow_content(&self) -> Result<(), EngineError> {
        if !self.store.workflows_empty()? {
            return Ok(());
        }
        let Ok(entries) = std::fs::read_dir(self.layout.workflows_dir()) else {
            return Ok(());
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let yaml = std::fs::read_to_string(&path)?;
            match jv_workflow::load_workflow(&yaml) {
                Ok(workflow) => {
                    let parsed = serde_json::to_string(&workflow)
                        .map_err(|e| EngineError::Internal(e.to_string()))?;
                    self.store.put_workflow(&workflow.name, &yaml, &parsed)?;
                    tracing::info!(workflow = %workflow.name, "workflow bootstrapped from mirror");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping invalid workflow");
                }
            }
        }
        Ok(())
    }

    /// Register (or update) a workflow document.
    pub fn put_workflow(&self, yaml: &str) -> Result<Workflow, EngineError> {
        let workflow = jv_workflow::load_workflow(yaml)?;
        let parsed =
            serde_json::to_string(&workflow).map_err(|e| EngineError::Internal(e.to_string()))?;
        self.store.put_workflow(&workflow.name, yaml, &parsed)?;
        Ok(workflow)
    }

    pub fn workflow(&self, name: &str) -> Result<Workflow, EngineError> {
        let content = self
            .store
            .get_workflow(name)?
            .ok_or_else(|| EngineError::NotFound(format!("workflow {name}")))?;
        serde_json::from_str(&content.parsed_json)
            .map_err(|e| EngineError::Internal(format!("stored workflow unparseable: {e}")))
    }

    pub fn list_issues(&self) -> Result<Vec<IssueSummary>, EngineError> {
        Ok(self.store.list_issues()?)
    }

    /// Canonical state dir for an issue, honouring the legacy location
    /// on read when the canonical one does not exist yet.
    pub fn state_dir(&self, issue: &IssueRef) -> PathBuf {
        let canonical = self.layout.state_dir(issue);
        if canonical.exists() {
            return canonical;
        }
        let legacy = self.layout.legacy_state_dir(issue);
        if legacy.exists() {
            return legacy;
        }
        canonical
    }

    pub fn read_state(&self, issue: &IssueRef) -> Result<Option<IssueState>, EngineError> {
        Ok(self.store.read_issue(&self.state_dir(issue))?)
    }

    fn require_state(&self, issue: &IssueRef) -> Result<IssueState, EngineError> {
        self.read_state(issue)?
            .ok_or_else(|| EngineError::NotFound(format!("issue {issue}")))
    }

    /// Set the active issue for this data dir.
    pub fn select(&self, issue: &IssueRef) -> Result<(), EngineError> {
        self.require_state(issue)?;
        self.store.set_active_issue(issue)?;
        self.publish_state(issue)?;
        Ok(())
    }

    pub fn active(&self) -> Result<Option<IssueRef>, EngineError> {
        Ok(self.store.active_issue()?)
    }

    /// Prepare the worktree/state for an issue and place it at the
    /// workflow's start phase.
    pub fn init(
        &self,
        issue: &IssueRef,
        workflow_name: &str,
        branch: Option<String>,
        issue_title: Option<String>,
    ) -> Result<IssueState, EngineError> {
        let workflow = self.workflow(workflow_name)?;
        let state_dir = self.layout.state_dir(issue);
        std::fs::create_dir_all(&state_dir)?;

        let branch =
            branch.unwrap_or_else(|| format!("jeeves/{}-{}", issue.repo, issue.number));
        let mut state = IssueState::new(branch, workflow.start.clone(), workflow_name);
        if let Some(title) = issue_title {
            state.issue_title = title;
        }
        state.updated_at_ms = self.store.write_issue(&state_dir, issue, &state)?;
        self.publish_state(issue)?;
        Ok(state)
    }

    /// Manual phase jump, validated against the issue's workflow.
    pub fn set_phase(&self, issue: &IssueRef, phase: &str) -> Result<IssueState, EngineError> {
        let mut state = self.require_state(issue)?;
        let workflow = self.workflow(&state.workflow)?;
        if workflow.phase(phase).is_none() {
            return Err(EngineError::field("phase", "not declared by the issue's workflow"));
        }
        state.phase = phase.to_string();
        state.updated_at_ms = self.store.write_issue(&self.state_dir(issue), issue, &state)?;
        self.publish_state(issue)?;
        Ok(state)
    }

    /// Validate and store an expanded issue title.
    pub fn expand_issue_summary(
        &self,
        issue: &IssueRef,
        title: &str,
    ) -> Result<IssueState, EngineError> {
        if title.trim().is_empty() {
            return Err(EngineError::field("title", "must not be empty"));
        }
        let mut state = self.require_state(issue)?;
        state.issue_title = title.trim().to_string();
        state.updated_at_ms = self.store.write_issue(&self.state_dir(issue), issue, &state)?;
        self.publish_state(issue)?;
        Ok(state)
    }

    /// Merge a status patch, run the workflow engine, persist whatever
    /// phase the engine lands on, and publish the new snapshot.
    pub fn advance_issue(
        &self,
        issue: &IssueRef,
        patch: Map<String, Value>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let mut state = self.require_state(issue)?;
        let workflow = self.workflow(&state.workflow)?;
        state.merge_status(patch);

        let outcome = advance(&workflow, &state.phase, &state.status)?;
        if let AdvanceOutcome::Moved { path } = &outcome {
            if let Some(last) = path.last() {
                state.phase = last.clone();
            }
        }
        state.updated_at_ms = self.store.write_issue(&self.state_dir(issue), issue, &state)?;
        self.publish_state(issue)?;
        Ok(outcome)
    }

    /// Full issue snapshot for observers.
    pub fn snapshot(&self, issue: &IssueRef) -> Result<IssueSnapshot, EngineError> {
        let state = self.require_state(issue)?;
        let issue_json =
            serde_json::to_value(&state).map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(IssueSnapshot {
            paths: IssuePaths {
                state_dir: self.state_dir(issue),
                worktree_dir: self.layout.worktree_dir(issue),
            },
            issue_json,
            run: self.runs.status(issue),
        })
    }

    fn publish_state(&self, issue: &IssueRef) -> Result<(), EngineError> {
        let snapshot = self.snapshot(issue)?;
        self.hub.broadcast(&HubEvent::State(snapshot));
        Ok(())
    }

    /// Create a run under an issue and spawn its driver.
    pub fn start_run(
        &self,
        issue: &IssueRef,
        options: StartRunOptions,
    ) -> Result<RunStatus, EngineError> {
        let this = self
            .self_ref
            .upgrade()
            .ok_or_else(|| EngineError::Internal("lifecycle dropped".to_string()))?;
        let state = self.require_state(issue)?;
        let workflow = self.workflow(&state.workflow)?;
        let ctx = driver::prepare(&this, issue, &state, workflow, options)?;
        let status = ctx.initial_status();
        tokio::spawn(driver::drive(ctx));
        Ok(status)
    }

    /// Graceful (or forced) stop. Idempotent.
    pub fn stop_run(&self, issue: &IssueRef, force: bool) -> bool {
        self.runs.stop(issue, force)
    }

    pub fn run_status(&self, issue: &IssueRef) -> Option<RunStatus> {
        self.runs.status(issue)
    }

    /// Tailer over the active run's viewer log, letting an observer that
    /// attaches mid-run replay what it missed.
    pub fn viewer_log_tailer(&self, issue: &IssueRef) -> Option<crate::tailer::LogTailer> {
        let status = self.runs.status(issue)?;
        status.viewer_log_file.map(crate::tailer::LogTailer::new)
    }

    // -- trajectory reflection --

    /// Build the reflection prompt for an issue from its memory, tasks,
    /// and previous reflection snapshot.
    pub fn reflection_prompt(
        &self,
        issue: &IssueRef,
        objective: &str,
    ) -> Result<String, EngineError> {
        let state_dir = self.state_dir(issue);
        let memory = self.store.list_memory(&state_dir, None)?;
        let memory: Vec<_> = memory.into_iter().filter(|m| !m.stale).collect();
        let tasks = self.store.read_tasks(&state_dir)?.unwrap_or_default();
        let previous = self.read_reflection_snapshot(issue);
        Ok(reflect::build_reflection_prompt(&ReflectInputs {
            objective,
            memory: &memory,
            tasks: &tasks.tasks,
            previous_snapshot: previous.as_ref(),
        }))
    }

    /// Validate a provider's reflection output against the same inputs
    /// the prompt was built from, then persist it as the new snapshot.
    pub fn apply_reflection(
        &self,
        issue: &IssueRef,
        objective: &str,
        assistant_text: Option<&str>,
    ) -> Result<Reflection, EngineError> {
        let state_dir = self.state_dir(issue);
        let memory = self.store.list_memory(&state_dir, None)?;
        let memory: Vec<_> = memory.into_iter().filter(|m| !m.stale).collect();
        let tasks = self.store.read_tasks(&state_dir)?.unwrap_or_default();
        let previous = self.read_reflection_snapshot(issue);

        let reflection = reflect::parse_reflection(
            assistant_text,
            &ReflectInputs {
                objective,
                memory: &memory,
                tasks: &tasks.tasks,
                previous_snapshot: previous.as_ref(),
            },
        )
        .map_err(|e| EngineError::Provider(e.to_string()))?;

        let snapshot = serde_json::to_value(&reflection)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        jv_store::atomic::write_json_atomic(&state_dir.join("reflection.json"), &snapshot)?;
        self.store.upsert_memory(
            &state_dir,
            MemoryScope::CrossRun,
            "last_reflection",
            &snapshot,
            0,
        )?;
        Ok(reflection)
    }

    fn read_reflection_snapshot(&self, issue: &IssueRef) -> Option<Value> {
        let path = self.state_dir(issue).join("reflection.json");
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    // -- managed project files --

    pub fn project_files(&self, issue: &IssueRef) -> ProjectFiles {
        ProjectFiles::new(self.layout.repo_files_dir(&issue.owner, &issue.repo))
    }

    /// Reconcile the issue's worktree against its managed-file set and
    /// remember the projected targets for the next pass.
    pub fn reconcile_project_files(
        &self,
        issue: &IssueRef,
    ) -> Result<ReconcileReport, EngineError> {
        let repo_files_dir = self.layout.repo_files_dir(&issue.owner, &issue.repo);
        let files = ProjectFiles::new(&repo_files_dir).list()?;
        let worktree_dir = self.layout.worktree_dir(issue);

        let targets_path = repo_files_dir.join("managed-targets.json");
        let previous: Vec<String> = std::fs::read_to_string(&targets_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();

        let report = reconcile(&ReconcileInputs {
            worktree_dir: &worktree_dir,
            repo_files_dir: &repo_files_dir,
            files: &files,
            previous_managed_targets: &previous,
        });

        // Remember what we projected, except when nothing was attempted.
        if report.sync_status != SyncStatus::DeferredWorktreeAbsent {
            let current: Vec<&str> = files.iter().map(|f| f.target_path.as_str()).collect();
            jv_store::atomic::write_json_atomic(&targets_path, &current)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
