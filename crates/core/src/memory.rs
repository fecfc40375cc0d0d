// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-issue memory entries.

use serde::{Deserialize, Serialize};

/// Scope of a memory entry. `(scope, key)` is unique per issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    WorkingSet,
    Decisions,
    Session,
    CrossRun,
}

impl MemoryScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "working_set" => Some(MemoryScope::WorkingSet),
            "decisions" => Some(MemoryScope::Decisions),
            "session" => Some(MemoryScope::Session),
            "cross_run" => Some(MemoryScope::CrossRun),
            _ => None,
        }
    }
}

crate::wire_label! {
    MemoryScope {
        WorkingSet => "working_set",
        Decisions => "decisions",
        Session => "session",
        CrossRun => "cross_run",
    }
}

/// One remembered fact. The value is an opaque record; staleness is a
/// soft-delete so readers can still trace where a fact came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub scope: MemoryScope,
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub source_iteration: u32,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub created_at_ms: u64,
    #[serde(default)]
    pub updated_at_ms: u64,
}
