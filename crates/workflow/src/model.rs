// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow document model: phases, transitions, guards by reference.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Write-scope granted to phases that don't declare their own.
pub const DEFAULT_ALLOWED_WRITES: &str = ".jeeves/*";

/// What kind of work a phase performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    /// Provider does open-ended work against the worktree.
    Execute,
    /// Provider inspects state and reports status findings.
    Evaluate,
    /// A declared command runs instead of a provider.
    Script,
    /// End state; no outbound transitions.
    Terminal,
}

jv_core::wire_label! {
    PhaseType {
        Execute => "execute",
        Evaluate => "evaluate",
        Script => "script",
        Terminal => "terminal",
    }
}

/// An outbound edge from a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub to: String,
    /// Guard expression over the issue's status map. Absent means
    /// unconditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// When set, the engine chains into the target phase within the same
    /// evaluation instead of pausing for external drive.
    #[serde(default)]
    pub auto: bool,
    /// Evaluated ascending; ties keep declaration order.
    #[serde(default)]
    pub priority: i32,
}

/// A node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(rename = "type")]
    pub phase_type: PhaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_allowed_writes")]
    pub allowed_writes: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Maps keys of a provider's structured output onto status keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_mapping: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

fn default_allowed_writes() -> Vec<String> {
    vec![DEFAULT_ALLOWED_WRITES.to_string()]
}

impl Phase {
    /// Transitions in evaluation order: ascending priority, declaration
    /// order for ties.
    pub fn ordered_transitions(&self) -> Vec<&Transition> {
        let mut ordered: Vec<&Transition> = self.transitions.iter().collect();
        ordered.sort_by_key(|t| t.priority);
        ordered
    }
}

/// A workflow document, phases in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    pub phases: IndexMap<String, Phase>,
}

fn default_version() -> u32 {
    1
}

impl Workflow {
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.get(name)
    }

    /// Resolve the model for a phase: the phase's own `model` wins,
    /// `default_model` fills the gap.
    pub fn model_for(&self, phase_name: &str) -> Option<&str> {
        let phase = self.phase(phase_name)?;
        phase.model.as_deref().or(self.default_model.as_deref())
    }
}
