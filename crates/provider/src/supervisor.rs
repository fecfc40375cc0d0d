// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provider supervisor: spawn, stream, time out, terminate.
//!
//! One supervisor owns one child process. The prompt goes to stdin which
//! is then closed; stdout lines become [`SupervisorEvent`]s on a bounded
//! channel. Two independent budgets run against the child — inactivity
//! and iteration wall-clock — and either one, like an external cancel,
//! walks the same SIGTERM → grace → force-kill path.

use crate::event::{parse_line, SupervisorEvent};
use crate::kill;
use jv_core::RunState;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// No output for this long → graceful termination.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Whole-iteration wall-clock budget.
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(3600);

/// How long a child gets between SIGTERM and the force kill.
pub const KILL_GRACE: Duration = Duration::from_secs(1);

/// Bounded event channel size. Structured events block the reader when
/// full; debug chunks are dropped instead.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How much trailing stderr to keep for diagnostics.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not found: {0}")]
    NotFound(String),

    #[error("provider spawn failed: {0}")]
    Spawn(String),
}

/// Which budget fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Inactivity,
    Iteration,
}

jv_core::wire_label! {
    TimeoutKind {
        Inactivity => "inactivity",
        Iteration => "iteration",
    }
}

/// Terminal result of one supervised run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { exit_code: i32 },
    Failed { exit_code: Option<i32>, error: Option<String> },
    TimedOut { kind: TimeoutKind },
    Cancelled,
}

impl RunOutcome {
    pub fn run_state(&self) -> RunState {
        match self {
            RunOutcome::Completed { .. } => RunState::Completed,
            RunOutcome::Failed { .. } => RunState::Failed,
            RunOutcome::TimedOut { .. } => RunState::TimedOut,
            RunOutcome::Cancelled => RunState::Cancelled,
        }
    }

    /// Short label for run status / logs.
    pub fn reason(&self) -> String {
        match self {
            RunOutcome::Completed { .. } => "completed".to_string(),
            RunOutcome::Failed { exit_code: Some(code), .. } => format!("failed (exit {code})"),
            RunOutcome::Failed { .. } => "failed".to_string(),
            RunOutcome::TimedOut { kind } => format!("{kind} timeout"),
            RunOutcome::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Configuration for one supervised run.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub prompt: String,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub inactivity_timeout: Duration,
    pub iteration_timeout: Duration,
    pub grace: Duration,
    pub channel_capacity: usize,
}

impl SupervisorConfig {
    pub fn new(program: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            prompt: prompt.into(),
            cwd: None,
            env: Vec::new(),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            iteration_timeout: DEFAULT_ITERATION_TIMEOUT,
            grace: KILL_GRACE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn iteration_timeout(mut self, timeout: Duration) -> Self {
        self.iteration_timeout = timeout;
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

/// Post-run telemetry that is not part of the outcome proper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTelemetry {
    /// Debug chunks dropped under back-pressure. Structured events are
    /// never dropped.
    pub dropped_debug_chunks: u64,
    /// Trailing stderr, for logs and diagnostics only. Never embedded in
    /// errors returned to callers.
    pub stderr_tail: String,
}

/// A live supervised run.
pub struct RunningProvider {
    pid: Option<u32>,
    events: mpsc::Receiver<SupervisorEvent>,
    cancel: CancellationToken,
    state: Arc<Mutex<RunState>>,
    supervise: JoinHandle<RunOutcome>,
    reader: JoinHandle<u64>,
    stderr: JoinHandle<String>,
}

impl RunningProvider {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Request termination. Idempotent; maps to SIGTERM, grace, then kill.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle callers can store to cancel from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Pull the next event. `None` once the child's output is finished.
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        self.events.recv().await
    }

    /// Wait for the run to settle and collect telemetry.
    pub async fn wait(self) -> (RunOutcome, RunTelemetry) {
        let RunningProvider { events, supervise, reader, stderr, .. } = self;
        drop(events);
        let outcome = match supervise.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed {
                exit_code: None,
                error: Some(format!("supervisor task failed: {e}")),
            },
        };
        let dropped_debug_chunks = reader.await.unwrap_or(0);
        let stderr_tail = stderr.await.unwrap_or_default();
        (outcome, RunTelemetry { dropped_debug_chunks, stderr_tail })
    }
}

/// Spawn a provider subprocess under supervision.
pub fn spawn(config: SupervisorConfig) -> Result<RunningProvider, ProviderError> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ProviderError::Spawn(format!("{}: {e}", config.program.display())))?;
    let pid = child.id();
    tracing::info!(program = %config.program.display(), ?pid, "provider spawned");

    // Prompt in, then close stdin so the provider sees EOF.
    if let Some(mut stdin) = child.stdin.take() {
        let prompt = config.prompt.clone();
        tokio::spawn(async move {
            let _ = stdin.write_all(prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        });
    }

    let activity = Arc::new(Mutex::new(Instant::now()));
    let state = Arc::new(Mutex::new(RunState::Starting));
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

    let reader = spawn_reader(child.stdout.take(), tx, Arc::clone(&activity));
    let stderr = spawn_stderr_tail(child.stderr.take());
    let supervise = tokio::spawn(supervise(
        child,
        pid,
        cancel.clone(),
        Arc::clone(&activity),
        Arc::clone(&state),
        config.inactivity_timeout,
        config.iteration_timeout,
        config.grace,
    ));

    Ok(RunningProvider { pid, events: rx, cancel, state, supervise, reader, stderr })
}

/// Read stdout lines into the bounded channel. Returns the number of
/// debug chunks dropped under back-pressure.
fn spawn_reader(
    stdout: Option<tokio::process::ChildStdout>,
    tx: mpsc::Sender<SupervisorEvent>,
    activity: Arc<Mutex<Instant>>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let Some(stdout) = stdout else { return 0 };
        let mut lines = BufReader::new(stdout).lines();
        let mut dropped = 0u64;
        while let Ok(Some(line)) = lines.next_line().await {
            *activity.lock() = Instant::now();
            match parse_line(&line) {
                Some(SupervisorEvent::Debug(chunk)) => {
                    match tx.try_send(SupervisorEvent::Debug(chunk)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Some(event) => {
                    // Structured events are never dropped; block for room.
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                None => {}
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "debug chunks dropped under back-pressure");
        }
        dropped
    })
}

/// Keep a bounded tail of stderr for diagnostics.
fn spawn_stderr_tail(stderr: Option<tokio::process::ChildStderr>) -> JoinHandle<String> {
    tokio::spawn(async move {
        let Some(mut stderr) = stderr else { return String::new() };
        let mut tail: Vec<u8> = Vec::new();
        let mut buf = [0u8; 1024];
        while let Ok(n) = stderr.read(&mut buf).await {
            if n == 0 {
                break;
            }
            tail.extend_from_slice(&buf[..n]);
            if tail.len() > STDERR_TAIL_BYTES {
                let cut = tail.len() - STDERR_TAIL_BYTES;
                tail.drain(..cut);
            }
        }
        String::from_utf8_lossy(&tail).into_owned()
    })
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    cancel: CancellationToken,
    activity: Arc<Mutex<Instant>>,
    state: Arc<Mutex<RunState>>,
    inactivity_timeout: Duration,
    iteration_timeout: Duration,
    grace: Duration,
) -> RunOutcome {
    *state.lock() = RunState::Running;
    let started = Instant::now();

    let outcome = loop {
        let idle_left = inactivity_timeout.saturating_sub(activity.lock().elapsed());
        let wall_left = iteration_timeout.saturating_sub(started.elapsed());

        tokio::select! {
            status = child.wait() => {
                break match status {
                    Ok(status) => match status.code() {
                        Some(0) => RunOutcome::Completed { exit_code: 0 },
                        code => RunOutcome::Failed { exit_code: code, error: None },
                    },
                    Err(e) => RunOutcome::Failed { exit_code: None, error: Some(e.to_string()) },
                };
            }
            _ = cancel.cancelled() => {
                tracing::info!(?pid, "provider cancelled");
                terminate(&mut child, pid, grace).await;
                break RunOutcome::Cancelled;
            }
            _ = tokio::time::sleep(idle_left) => {
                // Output may have arrived while we slept; re-check before
                // declaring the child idle.
                if activity.lock().elapsed() >= inactivity_timeout {
                    tracing::warn!(?pid, "provider inactivity timeout");
                    terminate(&mut child, pid, grace).await;
                    break RunOutcome::TimedOut { kind: TimeoutKind::Inactivity };
                }
            }
            _ = tokio::time::sleep(wall_left) => {
                if started.elapsed() >= iteration_timeout {
                    tracing::warn!(?pid, "provider iteration timeout");
                    terminate(&mut child, pid, grace).await;
                    break RunOutcome::TimedOut { kind: TimeoutKind::Iteration };
                }
            }
        }
    };

    *state.lock() = outcome.run_state();
    outcome
}

/// SIGTERM, wait out the grace window, then force kill (plus the tree
/// kill on windows).
async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    if let Some(pid) = pid {
        kill::send_graceful(pid);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        let _ = child.start_kill();
        if let Some(pid) = pid {
            kill::kill_tree(pid);
        }
        let _ = child.wait().await;
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
