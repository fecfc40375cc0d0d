// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run driver: invokes the provider (or script) for the current
//! phase, folds its output into the artifact and the hub, derives a
//! status patch, and lets the workflow engine decide what happens next.

use crate::diagnostics::{analyze_tool_calls, merge_summary, DiagnosticsSummary, IterationDiagnostics};
use crate::error::EngineError;
use crate::lifecycle::{IssueLifecycle, StartRunOptions};
use crate::output::OutputWriter;
use crate::run::RunGuard;
use jv_core::{scheduler, HubEvent, IssueRef, IssueState, LogLines, RunStatus, TaskStatus};
use jv_provider::{
    resolve_provider, spawn, ProviderCommand, ProviderEvent, RunOutcome, RunningProvider,
    SupervisorConfig, SupervisorEvent,
};
use jv_workflow::{AdvanceOutcome, Phase, PhaseType, Workflow};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) struct DriverCtx {
    lifecycle: Arc<IssueLifecycle>,
    issue: IssueRef,
    state_dir: PathBuf,
    worktree_dir: PathBuf,
    workflow: Workflow,
    options: StartRunOptions,
    guard: RunGuard,
}

impl DriverCtx {
    pub(crate) fn initial_status(&self) -> RunStatus {
        self.guard.status()
    }
}

/// Validate the start request and register the run. Everything that can
/// fail synchronously fails here, before a run slot is taken.
pub(crate) fn prepare(
    lifecycle: &Arc<IssueLifecycle>,
    issue: &IssueRef,
    state: &IssueState,
    workflow: Workflow,
    options: StartRunOptions,
) -> Result<DriverCtx, EngineError> {
    let phase = workflow
        .phase(&state.phase)
        .ok_or_else(|| EngineError::Internal(format!("issue stands on unknown phase {}", state.phase)))?;
    if phase.phase_type == PhaseType::Terminal {
        return Err(EngineError::conflict(
            "PHASE_TERMINAL",
            format!("phase {} is terminal; nothing to run", state.phase),
        ));
    }

    let command_display = match phase.phase_type {
        PhaseType::Script => phase.command.clone().unwrap_or_default(),
        _ => {
            let provider = resolve_phase_provider(phase, &options)?;
            format!("{} ({})", provider.program.display(), provider.name)
        }
    };

    let state_dir = lifecycle.state_dir(issue);
    let guard = lifecycle.runs().begin(
        issue,
        &state_dir,
        command_display,
        options.max_iterations,
        None,
    )?;

    Ok(DriverCtx {
        lifecycle: Arc::clone(lifecycle),
        issue: issue.clone(),
        state_dir,
        worktree_dir: lifecycle.layout().worktree_dir(issue),
        workflow,
        options,
        guard,
    })
}

/// Run to completion and settle the guard. Top-level task body.
pub(crate) async fn drive(ctx: DriverCtx) {
    let DriverCtx { lifecycle, issue, state_dir, worktree_dir, workflow, options, guard } = ctx;
    let driver = Driver { lifecycle, issue, state_dir, worktree_dir, workflow, options };
    match driver.run_loop(&guard).await {
        Ok(end) => guard.finish(end.returncode, &end.reason, end.error),
        Err(e) => {
            tracing::error!(error = %e, "run driver failed");
            guard.finish(None, "error", Some(e.to_string()));
        }
    }
}

struct Driver {
    lifecycle: Arc<IssueLifecycle>,
    issue: IssueRef,
    state_dir: PathBuf,
    worktree_dir: PathBuf,
    workflow: Workflow,
    options: StartRunOptions,
}

/// How a run settles, before the guard stamps it.
struct RunEnd {
    returncode: Option<i32>,
    reason: String,
    error: Option<String>,
}

impl RunEnd {
    fn clean(reason: &str) -> Self {
        Self { returncode: Some(0), reason: reason.to_string(), error: None }
    }
}

/// One provider/script invocation's result.
struct IterationEnd {
    outcome: RunOutcome,
    /// Structured fields from the terminal `result` event.
    result_extra: Option<Map<String, Value>>,
    /// The provider said it succeeded.
    result_success: bool,
    /// Tool-usage metrics from this invocation's captured calls.
    diagnostics: IterationDiagnostics,
}

impl Driver {
    async fn run_loop(&self, guard: &RunGuard) -> Result<RunEnd, EngineError> {
        let mut diagnostics = DiagnosticsSummary::default();
        for iteration in 1..=self.options.max_iterations {
            guard.update(|status| status.current_iteration = iteration);

            let state = self
                .lifecycle
                .read_state(&self.issue)?
                .ok_or_else(|| EngineError::NotFound(format!("issue {}", self.issue)))?;
            let phase = self
                .workflow
                .phase(&state.phase)
                .ok_or_else(|| {
                    EngineError::Internal(format!("issue stands on unknown phase {}", state.phase))
                })?
                .clone();
            let phase_name = state.phase.clone();

            if phase.phase_type == PhaseType::Terminal {
                return Ok(RunEnd::clean("workflow terminal"));
            }
            guard.viewer_log(&format!("iteration {iteration}: phase {phase_name}"));

            // A decomposition already happened when a split tasks file
            // with ready tasks exists; execute phases then run a wave.
            let end = if phase.phase_type == PhaseType::Execute {
                match self.try_wave(guard, &state, &phase, &phase_name).await? {
                    Some(end) => end,
                    None => self.single_iteration(guard, &state, &phase, &phase_name, None).await?,
                }
            } else {
                self.single_iteration(guard, &state, &phase, &phase_name, None).await?
            };

            // Cross-iteration hygiene metrics ride along with the run.
            diagnostics = merge_summary(&diagnostics, &end.diagnostics);
            jv_store::atomic::write_json_atomic(
                &guard.run_dir().join("diagnostics.json"),
                &diagnostics,
            )?;

            match &end.outcome {
                RunOutcome::Cancelled => {
                    return Ok(RunEnd {
                        returncode: None,
                        reason: end.outcome.reason(),
                        error: None,
                    });
                }
                RunOutcome::TimedOut { kind } => {
                    return Ok(RunEnd {
                        returncode: None,
                        reason: end.outcome.reason(),
                        error: Some(format!("provider hit the {kind} timeout")),
                    });
                }
                RunOutcome::Failed { exit_code, .. } => {
                    return Ok(RunEnd {
                        returncode: *exit_code,
                        reason: end.outcome.reason(),
                        error: Some("provider exited unsuccessfully".to_string()),
                    });
                }
                RunOutcome::Completed { .. } => {}
            }

            if end.result_success {
                guard.update(|status| status.completed_via_promise = true);
            }

            let patch = derive_status_patch(
                &phase,
                end.result_extra.as_ref(),
                &self.state_dir,
                end.result_success,
            );
            match self.lifecycle.advance_issue(&self.issue, patch)? {
                AdvanceOutcome::Moved { path } => {
                    guard.update(|status| status.completed_via_state = true);
                    guard.viewer_log(&format!("advanced: {}", path.join(" -> ")));
                }
                AdvanceOutcome::Terminal => {
                    guard.update(|status| status.completed_via_state = true);
                    return Ok(RunEnd::clean("workflow terminal"));
                }
                AdvanceOutcome::NoTransition => {
                    // The phase stands; the next iteration drives it again.
                    guard.viewer_log("no transition matched; phase stands");
                }
            }
        }

        Ok(RunEnd::clean("max_iterations reached"))
    }

    /// Invoke the phase once (provider or script) and pump its events.
    /// `worker` scopes hub events and artifacts to one wave worker.
    async fn single_iteration(
        &self,
        guard: &RunGuard,
        state: &IssueState,
        phase: &Phase,
        phase_name: &str,
        worker: Option<&WorkerCtx>,
    ) -> Result<IterationEnd, EngineError> {
        let config = match phase.phase_type {
            PhaseType::Script => self.script_config(state, phase, phase_name)?,
            _ => self.provider_config(state, phase, phase_name, worker)?,
        };

        let output_dir = match worker {
            Some(worker) => worker.dir.clone(),
            None => guard.run_dir().to_path_buf(),
        };
        std::fs::create_dir_all(&output_dir)?;
        let mut writer = OutputWriter::new(output_dir.join("output.json"), output_dir.join("raw"));

        let mut provider = spawn(config)?;
        if worker.is_none() {
            guard.update(|status| status.pid = provider.pid());
        }

        // External stop requests flow into the provider's own cancel.
        let cancel_link = {
            let guard_token = guard.cancel_token();
            let provider_token = provider.cancel_token();
            tokio::spawn(async move {
                guard_token.cancelled().await;
                provider_token.cancel();
            })
        };

        let (mut result_extra, mut result_success) =
            self.pump(guard, &mut provider, &mut writer, worker).await?;

        let (outcome, telemetry) = provider.wait().await;
        cancel_link.abort();

        // Scripts speak exit codes, not result events.
        if phase.phase_type == PhaseType::Script {
            result_success = matches!(outcome, RunOutcome::Completed { .. });
            let mut extra = Map::new();
            if let RunOutcome::Completed { exit_code } | RunOutcome::Failed { exit_code: Some(exit_code), .. } = outcome {
                extra.insert("exit_code".to_string(), Value::from(exit_code));
            }
            result_extra = Some(extra);
        }

        if !telemetry.stderr_tail.is_empty() {
            for line in telemetry.stderr_tail.lines().rev().take(5).collect::<Vec<_>>().into_iter().rev()
            {
                self.log_line(guard, worker, &format!("stderr: {line}"));
            }
        }

        let success = matches!(outcome, RunOutcome::Completed { .. }) && result_success;
        let finalize_error = match &outcome {
            RunOutcome::Completed { .. } => None,
            RunOutcome::Failed { .. } => Some(("provider exited unsuccessfully", "provider_failed")),
            RunOutcome::TimedOut { .. } => Some(("provider timed out", "timeout")),
            RunOutcome::Cancelled => Some(("run cancelled", "cancelled")),
        };
        writer.finalize(success, finalize_error)?;

        let diagnostics = analyze_tool_calls(&writer.document().tool_calls);
        for warning in &diagnostics.warnings {
            self.log_line(guard, worker, &format!("diagnostics: {warning}"));
        }

        Ok(IterationEnd { outcome, result_extra, result_success, diagnostics })
    }

    fn provider_config(
        &self,
        state: &IssueState,
        phase: &Phase,
        phase_name: &str,
        worker: Option<&WorkerCtx>,
    ) -> Result<SupervisorConfig, EngineError> {
        let provider = resolve_phase_provider(phase, &self.options)?;

        let mut prompt = self.render_prompt(state, phase, phase_name)?;
        if let Some(worker) = worker {
            prompt.push_str(&worker.prompt_suffix);
        }

        let mut args = Vec::new();
        if let Some(model) = self.workflow.model_for(phase_name) {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        let mut config = SupervisorConfig::new(provider.program, prompt).args(args);
        if self.worktree_dir.is_dir() {
            config = config.cwd(self.worktree_dir.clone());
        }
        Ok(self.apply_timeouts(config))
    }

    fn script_config(
        &self,
        state: &IssueState,
        phase: &Phase,
        phase_name: &str,
    ) -> Result<SupervisorConfig, EngineError> {
        let template = phase
            .command
            .as_deref()
            .ok_or_else(|| EngineError::Internal(format!("script phase {phase_name} lost its command")))?;
        let command = jv_workflow::interpolate_shell(template, &self.prompt_vars(state, phase_name));

        let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("/bin/sh", "-c") };
        let mut config =
            SupervisorConfig::new(shell, String::new()).args(vec![flag.to_string(), command]);
        if self.worktree_dir.is_dir() {
            config = config.cwd(self.worktree_dir.clone());
        }
        Ok(self.apply_timeouts(config))
    }

    fn apply_timeouts(&self, mut config: SupervisorConfig) -> SupervisorConfig {
        if let Some(t) = self.options.inactivity_timeout {
            config = config.inactivity_timeout(t);
        }
        if let Some(t) = self.options.iteration_timeout {
            config = config.iteration_timeout(t);
        }
        config
    }

    fn prompt_vars(&self, state: &IssueState, phase_name: &str) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("issue".to_string(), self.issue.to_string());
        vars.insert("issue.title".to_string(), state.issue_title.clone());
        vars.insert("branch".to_string(), state.branch.clone());
        vars.insert("phase".to_string(), phase_name.to_string());
        vars.insert("workflow".to_string(), state.workflow.clone());
        vars.insert("workspace".to_string(), self.worktree_dir.display().to_string());
        vars
    }

    /// A phase prompt names a stored prompt when one exists by that id;
    /// otherwise it is the prompt text itself.
    fn render_prompt(
        &self,
        state: &IssueState,
        phase: &Phase,
        phase_name: &str,
    ) -> Result<String, EngineError> {
        let declared = phase
            .prompt
            .as_deref()
            .ok_or_else(|| EngineError::Internal(format!("provider phase {phase_name} lost its prompt")))?;
        let body = match self.lifecycle.store().get_prompt(declared)? {
            Some(stored) => stored.body,
            None => declared.to_string(),
        };
        Ok(jv_workflow::interpolate(&body, &self.prompt_vars(state, phase_name)))
    }

    /// Pump supervisor events into the writer and the hub until the
    /// stream ends. Returns the terminal result's fields.
    async fn pump(
        &self,
        guard: &RunGuard,
        provider: &mut RunningProvider,
        writer: &mut OutputWriter,
        worker: Option<&WorkerCtx>,
    ) -> Result<(Option<Map<String, Value>>, bool), EngineError> {
        let mut result_extra = None;
        let mut result_success = false;

        while let Some(event) = provider.next_event().await {
            match event {
                SupervisorEvent::Event(event) => {
                    if let ProviderEvent::Result { success, extra, .. } = &event {
                        result_success = *success;
                        result_extra = Some(extra.clone());
                    }
                    if let Some(hub_event) = writer.record(&event)? {
                        self.broadcast(worker, hub_event);
                    }
                }
                SupervisorEvent::Debug(chunk) => {
                    self.log_line(guard, worker, &chunk);
                }
            }
        }

        Ok((result_extra, result_success))
    }

    fn broadcast(&self, worker: Option<&WorkerCtx>, event: HubEvent) {
        match worker {
            Some(worker) => {
                let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
                self.lifecycle.hub().broadcast(&HubEvent::WorkerSdk {
                    worker_id: worker.id.clone(),
                    payload,
                });
            }
            None => self.lifecycle.hub().broadcast(&event),
        }
    }

    fn log_line(&self, guard: &RunGuard, worker: Option<&WorkerCtx>, line: &str) {
        match worker {
            Some(worker) => self.lifecycle.hub().broadcast(&HubEvent::WorkerLogs {
                worker_id: worker.id.clone(),
                lines: LogLines { lines: vec![line.to_string()], reset: false },
            }),
            None => guard.viewer_log(line),
        }
    }

    /// Run a parallel wave when this execute phase has ready tasks.
    /// Returns `None` when there is nothing to fan out.
    async fn try_wave(
        &self,
        guard: &RunGuard,
        state: &IssueState,
        phase: &Phase,
        phase_name: &str,
    ) -> Result<Option<IterationEnd>, EngineError> {
        let Some(mut tasks) = self.lifecycle.store().read_tasks(&self.state_dir)? else {
            return Ok(None);
        };
        if !tasks.tasks_split {
            return Ok(None);
        }
        let ready = scheduler::select_ready(&tasks.tasks, self.options.max_parallel_tasks)?;
        if ready.is_empty() {
            return Ok(None);
        }

        // A previously-interrupted wave keeps its artifacts key; a fresh
        // wave claims the current run id.
        let wave_run_id =
            jv_core::worker_artifacts_run_id(state, guard.run_id()).to_string();
        let mut state = state.clone();
        state.set_parallel_run_id(&wave_run_id);
        self.persist_state(&state)?;

        let worker_ids: Vec<String> = ready.iter().map(|t| t.id.clone()).collect();
        guard.update(|status| {
            status.workers = Some(worker_ids.clone());
            status.max_parallel_tasks = Some(self.options.max_parallel_tasks);
        });
        guard.viewer_log(&format!(
            "parallel wave {wave_run_id}: {} worker(s)",
            worker_ids.len()
        ));

        for task in &ready {
            set_task_status(&mut tasks.tasks, &task.id, TaskStatus::InProgress);
        }
        self.lifecycle.store().write_tasks(&self.state_dir, &tasks)?;

        let workers_dir = self.state_dir.join("runs").join(&wave_run_id).join("workers");
        let mut wave_outcome: Option<RunOutcome> = None;

        // Ready-set size is already capped at max_parallel_tasks, so the
        // whole batch runs concurrently.
        let mut join_set = tokio::task::JoinSet::new();
        for task in ready {
            let worker = WorkerCtx {
                id: task.id.clone(),
                dir: workers_dir.join(&task.id),
                prompt_suffix: worker_prompt_suffix(&task),
            };
            let driver = self.clone_for_worker();
            let guard_token = guard.cancel_token();
            let state = state.clone();
            let phase = phase.clone();
            let phase_name = phase_name.to_string();
            join_set.spawn(async move {
                let end = driver
                    .worker_iteration(&state, &phase, &phase_name, &worker, guard_token)
                    .await;
                (worker.id, end)
            });
        }

        let mut results: Vec<(String, bool)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let Ok((worker_id, end)) = joined else {
                continue;
            };
            match end {
                Ok(end) => {
                    let passed = matches!(end.outcome, RunOutcome::Completed { .. })
                        && end.result_success;
                    if !matches!(end.outcome, RunOutcome::Completed { .. }) {
                        wave_outcome.get_or_insert(end.outcome);
                    }
                    results.push((worker_id, passed));
                }
                Err(e) => {
                    tracing::warn!(worker = %worker_id, error = %e, "wave worker failed");
                    results.push((worker_id, false));
                }
            }
        }

        for (worker_id, passed) in &results {
            let status = if *passed { TaskStatus::Passed } else { TaskStatus::Failed };
            set_task_status(&mut tasks.tasks, worker_id, status);
            guard.viewer_log(&format!("worker {worker_id}: {status}"));
        }
        self.lifecycle.store().write_tasks(&self.state_dir, &tasks)?;

        // Every selected task reached a terminal status: the wave has
        // settled and the bookkeeping goes away.
        state.clear_parallel();
        self.persist_state(&state)?;

        let all_passed = tasks.tasks.iter().all(|t| t.status == TaskStatus::Passed);
        let mut extra = Map::new();
        extra.insert("tasksComplete".to_string(), Value::Bool(all_passed));

        Ok(Some(IterationEnd {
            outcome: wave_outcome.unwrap_or(RunOutcome::Completed { exit_code: 0 }),
            result_extra: Some(extra),
            result_success: results.iter().all(|(_, passed)| *passed),
            // Per-worker metrics were logged as they settled.
            diagnostics: IterationDiagnostics::default(),
        }))
    }

    /// One wave worker: a scoped provider iteration wired to the guard's
    /// cancel token.
    async fn worker_iteration(
        &self,
        state: &IssueState,
        phase: &Phase,
        phase_name: &str,
        worker: &WorkerCtx,
        guard_token: tokio_util::sync::CancellationToken,
    ) -> Result<IterationEnd, EngineError> {
        std::fs::create_dir_all(&worker.dir)?;
        let mut writer =
            OutputWriter::new(worker.dir.join("output.json"), worker.dir.join("raw"));

        let config = self.provider_config(state, phase, phase_name, Some(worker))?;
        let mut provider = spawn(config)?;

        let cancel_link = {
            let provider_token = provider.cancel_token();
            tokio::spawn(async move {
                guard_token.cancelled().await;
                provider_token.cancel();
            })
        };

        let pump = self
            .pump_worker(&mut provider, &mut writer, worker)
            .await;
        let (outcome, _telemetry) = provider.wait().await;
        cancel_link.abort();

        let (result_extra, result_success) = pump?;
        let success = matches!(outcome, RunOutcome::Completed { .. }) && result_success;
        writer.finalize(success, None)?;

        let diagnostics = analyze_tool_calls(&writer.document().tool_calls);
        for warning in &diagnostics.warnings {
            self.lifecycle.hub().broadcast(&HubEvent::WorkerLogs {
                worker_id: worker.id.clone(),
                lines: LogLines { lines: vec![format!("diagnostics: {warning}")], reset: false },
            });
        }

        Ok(IterationEnd { outcome, result_extra, result_success, diagnostics })
    }

    async fn pump_worker(
        &self,
        provider: &mut RunningProvider,
        writer: &mut OutputWriter,
        worker: &WorkerCtx,
    ) -> Result<(Option<Map<String, Value>>, bool), EngineError> {
        let mut result_extra = None;
        let mut result_success = false;
        while let Some(event) = provider.next_event().await {
            match event {
                SupervisorEvent::Event(event) => {
                    if let ProviderEvent::Result { success, extra, .. } = &event {
                        result_success = *success;
                        result_extra = Some(extra.clone());
                    }
                    if let Some(hub_event) = writer.record(&event)? {
                        let payload = serde_json::to_value(&hub_event).unwrap_or(Value::Null);
                        self.lifecycle.hub().broadcast(&HubEvent::WorkerSdk {
                            worker_id: worker.id.clone(),
                            payload,
                        });
                    }
                }
                SupervisorEvent::Debug(chunk) => {
                    self.lifecycle.hub().broadcast(&HubEvent::WorkerLogs {
                        worker_id: worker.id.clone(),
                        lines: LogLines { lines: vec![chunk], reset: false },
                    });
                }
            }
        }
        Ok((result_extra, result_success))
    }

    fn persist_state(&self, state: &IssueState) -> Result<(), EngineError> {
        self.lifecycle.store().write_issue(&self.state_dir, &self.issue, state)?;
        Ok(())
    }

    fn clone_for_worker(&self) -> Driver {
        Driver {
            lifecycle: Arc::clone(&self.lifecycle),
            issue: self.issue.clone(),
            state_dir: self.state_dir.clone(),
            worktree_dir: self.worktree_dir.clone(),
            workflow: self.workflow.clone(),
            options: self.options.clone(),
        }
    }
}

struct WorkerCtx {
    id: String,
    dir: PathBuf,
    prompt_suffix: String,
}

fn worker_prompt_suffix(task: &jv_core::Task) -> String {
    let mut suffix = format!("\n\n## Assigned task: {}\n", task.id);
    if let Some(title) = &task.title {
        suffix.push_str(&format!("{title}\n"));
    }
    if let Some(summary) = &task.summary {
        suffix.push_str(&format!("{summary}\n"));
    }
    if let Some(criteria) = &task.acceptance_criteria {
        suffix.push_str("Acceptance criteria:\n");
        for criterion in criteria {
            suffix.push_str(&format!("- {criterion}\n"));
        }
    }
    if let Some(files) = &task.files_allowed {
        suffix.push_str(&format!("Only modify: {}\n", files.join(", ")));
    }
    suffix
}

fn set_task_status(tasks: &mut [jv_core::Task], id: &str, status: TaskStatus) {
    if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
        task.status = status;
    }
}

fn resolve_phase_provider(
    phase: &Phase,
    options: &StartRunOptions,
) -> Result<ProviderCommand, EngineError> {
    let name = options
        .provider
        .as_deref()
        .or(phase.provider.as_deref())
        .ok_or_else(|| EngineError::field("provider", "phase declares no provider"))?;
    resolve_provider(name).ok_or_else(|| {
        EngineError::Provider(format!(
            "provider {name} not found (set {})",
            ProviderCommand::env_var(name)
        ))
    })
}

/// Map an iteration's structured outputs onto a status patch.
///
/// The declared `output_file` (relative to the state dir) wins over the
/// terminal result event's fields; `status_mapping` renames source keys
/// onto (possibly dotted) status paths, with the pseudo-key `success`
/// always available. Without a mapping, only `lastRunSucceeded` is set.
fn derive_status_patch(
    phase: &Phase,
    result_extra: Option<&Map<String, Value>>,
    state_dir: &Path,
    success: bool,
) -> Map<String, Value> {
    let mut source = Map::new();
    if let Some(extra) = result_extra {
        for (key, value) in extra {
            source.insert(key.clone(), value.clone());
        }
    }
    if let Some(file) = &phase.output_file {
        if let Ok(text) = std::fs::read_to_string(state_dir.join(file)) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
                for (key, value) in map {
                    source.insert(key, value);
                }
            }
        }
    }

    let mut patch = Map::new();
    match &phase.status_mapping {
        Some(mapping) => {
            for (from, to) in mapping {
                let value = match from.as_str() {
                    "success" => Some(Value::Bool(success)),
                    key => source.get(key).cloned(),
                };
                if let Some(value) = value {
                    insert_dotted(&mut patch, to, value);
                }
            }
        }
        None => {
            patch.insert("lastRunSucceeded".to_string(), Value::Bool(success));
        }
    }
    patch
}

/// Insert a value at a dotted path, creating intermediate objects.
fn insert_dotted(map: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = match segments.pop() {
        Some(last) => last,
        None => return,
    };
    let mut current = map;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry.as_object_mut() {
            Some(next) => next,
            None => return,
        };
    }
    current.insert(last.to_string(), value);
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
