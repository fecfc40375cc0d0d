// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands a client can issue. Issue references travel as
//! `owner/repo#n` strings and are validated server-side.

use crate::status::Secret;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Health check.
    Ping,

    /// Daemon status.
    Status,

    ListIssues,

    SelectIssue {
        issue: String,
    },

    InitIssue {
        issue: String,
        workflow: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    StartRun {
        /// Defaults to the active issue when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_iterations: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_parallel_tasks: Option<usize>,
    },

    StopRun {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue: Option<String>,
        #[serde(default)]
        force: bool,
    },

    SetPhase {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue: Option<String>,
        phase: String,
    },

    ExpandIssueSummary {
        issue: String,
        title: String,
    },

    UpsertProjectFile {
        issue: String,
        display_name: String,
        target_path: String,
        content: String,
        /// Replace an existing record at the same target path instead of
        /// conflicting.
        #[serde(default)]
        replace: bool,
    },

    DeleteProjectFile {
        issue: String,
        id: u64,
    },

    ReconcileProjectFiles {
        issue: String,
    },

    /// Store a credential. The value is write-only: it never appears in
    /// any response or event, and its Debug form is redacted.
    PutCredentials {
        provider: String,
        token: Secret,
    },

    DeleteCredentials {
        provider: String,
    },

    /// Upgrade this connection to a push stream of hub events.
    Subscribe,
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
