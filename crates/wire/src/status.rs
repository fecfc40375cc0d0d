// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTOs for replies, and the write-only secret wrapper.

use serde::{Deserialize, Serialize};

/// A write-only secret value.
///
/// Debug prints a redaction marker, there is no `Display`, and the value
/// can only be extracted through [`Secret::reveal`], which the server
/// does exactly once to hand the bytes to the secret file writer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the wrapper and expose the value.
    pub fn reveal(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// One issue in a `list_issues` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRow {
    pub issue: String,
    pub issue_title: String,
    pub branch: String,
    pub phase: String,
    pub workflow: String,
    pub updated_at_ms: u64,
}

/// One managed file in project-file replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub id: u64,
    pub display_name: String,
    pub target_path: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub updated_at_ms: u64,
}

/// Reconcile outcome for a `reconcile_project_files` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub sync_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Daemon health for the `status` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub uptime_secs: u64,
    pub issues: usize,
    pub subscribers: usize,
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
