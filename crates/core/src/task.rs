// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-issue task records for decomposition phases.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status of a task through its lifecycle.
///
/// Transitions are monotonic except `failed → pending` (retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Passed,
    Failed,
}

impl TaskStatus {
    /// A task is retryable when it has never run or its last run failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Failed)
    }

    /// Ordering rank for ready-set selection: failed before pending.
    pub(crate) fn ready_rank(&self) -> u8 {
        match self {
            TaskStatus::Failed => 0,
            TaskStatus::Pending => 1,
            TaskStatus::InProgress | TaskStatus::Passed => 2,
        }
    }
}

crate::wire_label! {
    TaskStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Passed => "passed",
        Failed => "failed",
    }
}

/// A unit of parallelizable work within one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique within the issue.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<Vec<String>>,
    /// Task ids within the same issue. Duplicates are preserved in the
    /// source representation; scheduling treats them as a set.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

/// The tasks file for one issue, preserving unknown fields so a
/// read-modify-write round-trips whatever a decomposition phase wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks_split: bool,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskList {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks_split: !tasks.is_empty(), tasks, extra: Map::new() }
    }
}

crate::test_builder! {
    pub struct TaskBuilder => Task {
        required {
            id: String = "task-1",
            depends_on: Vec<String> = Vec::new(),
            status: TaskStatus = TaskStatus::Pending,
        }
        optional {
            title: String,
            summary: String,
            files_allowed: Vec<String>,
            acceptance_criteria: Vec<String>,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
