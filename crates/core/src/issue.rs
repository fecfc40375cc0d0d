// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue identity and per-issue state.
//!
//! `IssueState.status` is deliberately opaque: guard expressions and
//! parallel-mode bookkeeping read it through path lookups, and everything
//! else goes through the typed accessors below. Callers never depend on
//! the shape of the status map beyond the sub-paths they own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reference to a tracked issue: `(owner, repo, number)`.
///
/// Stringified as `owner/repo#n` everywhere it crosses a boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Errors from parsing an `owner/repo#n` reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssueRefError {
    #[error("issue ref missing '#': {0}")]
    MissingNumber(String),
    #[error("issue ref missing 'owner/repo': {0}")]
    MissingRepo(String),
    #[error("issue number is not an integer: {0}")]
    BadNumber(String),
}

impl IssueRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self { owner: owner.into(), repo: repo.into(), number }
    }

    /// Parse an `owner/repo#n` string.
    pub fn parse(s: &str) -> Result<Self, IssueRefError> {
        let (repo_part, number) = s
            .rsplit_once('#')
            .ok_or_else(|| IssueRefError::MissingNumber(s.to_string()))?;
        let (owner, repo) = repo_part
            .split_once('/')
            .ok_or_else(|| IssueRefError::MissingRepo(s.to_string()))?;
        if owner.is_empty() || repo.is_empty() {
            return Err(IssueRefError::MissingRepo(s.to_string()));
        }
        let number = number
            .parse::<u64>()
            .map_err(|_| IssueRefError::BadNumber(s.to_string()))?;
        Ok(Self::new(owner, repo, number))
    }
}

impl std::fmt::Display for IssueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl std::str::FromStr for IssueRef {
    type Err = IssueRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Durable per-issue state: the workflow position plus the open-schema
/// status map that guards evaluate against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueState {
    pub branch: String,
    pub phase: String,
    pub workflow: String,
    #[serde(default)]
    pub issue_title: String,
    /// Open-schema mapping used by guard expressions and parallel-mode
    /// bookkeeping. Values are booleans, numbers, or strings by
    /// convention, but nothing enforces that here.
    #[serde(default)]
    pub status: Map<String, Value>,
    /// Set by the store on every successful write; monotonic per issue.
    #[serde(default)]
    pub updated_at_ms: u64,
}

impl IssueState {
    pub fn new(
        branch: impl Into<String>,
        phase: impl Into<String>,
        workflow: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            phase: phase.into(),
            workflow: workflow.into(),
            issue_title: String::new(),
            status: Map::new(),
            updated_at_ms: 0,
        }
    }

    /// Walk a dotted path through the status map.
    ///
    /// Any non-mapping intermediate yields `None`.
    pub fn status_path(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self.status.get(*path.first()?)?;
        for key in &path[1..] {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// The worker-artifacts key for a resumed parallel wave
    /// (`status.parallel.runId`), if present.
    pub fn parallel_run_id(&self) -> Option<&str> {
        self.status_path(&["parallel", "runId"])?.as_str()
    }

    /// Record the run id owning the in-flight parallel wave.
    pub fn set_parallel_run_id(&mut self, run_id: &str) {
        let parallel = self
            .status
            .entry("parallel".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = parallel {
            map.insert("runId".to_string(), Value::String(run_id.to_string()));
        } else {
            let mut map = Map::new();
            map.insert("runId".to_string(), Value::String(run_id.to_string()));
            *parallel = Value::Object(map);
        }
    }

    /// Clear parallel bookkeeping once a wave has fully settled.
    pub fn clear_parallel(&mut self) {
        self.status.remove("parallel");
    }

    /// Shallow-merge a status patch. Later keys win.
    pub fn merge_status(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.status.insert(key, value);
        }
    }
}

crate::test_builder! {
    pub struct IssueStateBuilder => IssueState {
        required {
            branch: String = "jeeves/issue-1",
            phase: String = "plan",
            workflow: String = "default",
            issue_title: String = "",
            status: Map<String, Value> = Map::new(),
            updated_at_ms: u64 = 0u64,
        }
    }
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
