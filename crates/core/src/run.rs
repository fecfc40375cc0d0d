// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run state machine and the run-status surface observers see.

use crate::issue::IssueState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier for one provider session within a run.
///
/// Providers usually report their own session id in the init event;
/// [`SessionId::generate`] is the fallback when they don't, so every
/// output artifact still carries a distinct session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Prefix on generated (as opposed to provider-reported) ids.
    pub const GENERATED_PREFIX: &'static str = "ses-";

    /// Mint a fresh fallback id.
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::GENERATED_PREFIX, nanoid::nanoid!(19)))
    }

    /// Wrap an id a provider reported.
    pub fn reported(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Whether this id was minted locally rather than provider-reported.
    pub fn is_generated(&self) -> bool {
        self.0.starts_with(Self::GENERATED_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of one supervised run. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Starting,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::TimedOut | RunState::Cancelled
        )
    }
}

crate::wire_label! {
    RunState {
        Starting => "starting",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        TimedOut => "timed_out",
        Cancelled => "cancelled",
    }
}

/// Run status as surfaced to observers (the `run` hub event payload).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub max_iterations: u32,
    #[serde(default)]
    pub current_iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub issue_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_log_file: Option<PathBuf>,
    /// Worker ids of an in-flight parallel wave, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_tasks: Option<usize>,
    /// The provider's terminal result event reported success.
    #[serde(default)]
    pub completed_via_promise: bool,
    /// A guard-matched transition out of the running phase was observed.
    #[serde(default)]
    pub completed_via_state: bool,
}

/// Resolve the key under which worker artifacts live for a run.
///
/// A previously-interrupted parallel wave stores its run id in
/// `status.parallel.runId`; that value wins over the current run's id
/// whenever it is present and non-blank after trimming.
pub fn worker_artifacts_run_id<'a>(issue: &'a IssueState, current_run_id: &'a str) -> &'a str {
    match issue.parallel_run_id().map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => current_run_id,
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
