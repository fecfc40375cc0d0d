// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub event envelopes delivered to push-stream subscribers.
//!
//! Serializes as `{"event": "<name>", "data": {...}}`. Credential secrets
//! are unrepresentable here: [`CredentialStatus`] carries no value field.

use crate::run::RunStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Paths of interest for one issue, sent with `state` snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuePaths {
    pub state_dir: PathBuf,
    pub worktree_dir: PathBuf,
}

/// Full issue snapshot for the `state` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub paths: IssuePaths,
    pub issue_json: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunStatus>,
}

/// Incremental log lines for `logs` / `viewer-logs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogLines {
    pub lines: Vec<String>,
    /// Set when the underlying file was truncated or replaced and the
    /// observer should discard what it has shown so far.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset: bool,
}

/// Credential status safe for events and responses. The secret value
/// exists only on the write-only request record and never here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub provider: String,
    pub has_token: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at_ms: Option<u64>,
}

/// Typed event envelope broadcast through the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HubEvent {
    #[serde(rename = "state")]
    State(IssueSnapshot),

    #[serde(rename = "run")]
    Run(RunStatus),

    #[serde(rename = "logs")]
    Logs(LogLines),

    #[serde(rename = "viewer-logs")]
    ViewerLogs(LogLines),

    #[serde(rename = "sdk-init")]
    SdkInit { session_id: String, started_at: String, status: String },

    #[serde(rename = "sdk-tool-start")]
    SdkToolStart { tool_use_id: String, name: String, input: Value },

    #[serde(rename = "sdk-tool-complete")]
    SdkToolComplete {
        tool_use_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_text: Option<String>,
        #[serde(default)]
        response_truncated: bool,
    },

    #[serde(rename = "sdk-message")]
    SdkMessage { message: Value, index: usize, total: usize },

    #[serde(rename = "sdk-complete")]
    SdkComplete {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },

    /// `logs` scoped to one worker of a parallel wave.
    #[serde(rename = "worker-logs")]
    WorkerLogs {
        worker_id: String,
        #[serde(flatten)]
        lines: LogLines,
    },

    /// An sdk event scoped to one worker of a parallel wave.
    #[serde(rename = "worker-sdk")]
    WorkerSdk { worker_id: String, payload: Value },

    #[serde(rename = "credentials-status")]
    CredentialsStatus(CredentialStatus),
}

impl HubEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::State(_) => "state",
            HubEvent::Run(_) => "run",
            HubEvent::Logs(_) => "logs",
            HubEvent::ViewerLogs(_) => "viewer-logs",
            HubEvent::SdkInit { .. } => "sdk-init",
            HubEvent::SdkToolStart { .. } => "sdk-tool-start",
            HubEvent::SdkToolComplete { .. } => "sdk-tool-complete",
            HubEvent::SdkMessage { .. } => "sdk-message",
            HubEvent::SdkComplete { .. } => "sdk-complete",
            HubEvent::WorkerLogs { .. } => "worker-logs",
            HubEvent::WorkerSdk { .. } => "worker-sdk",
            HubEvent::CredentialsStatus(_) => "credentials-status",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
