// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trajectory reflection: prompt assembly and strict validation of the
//! provider's reflection object.
//!
//! The validation rule is deliberately blunt: every reflected item must
//! share at least one token with the provided memory/tasks/snapshot
//! corpus. Hallucinated items fail the whole call.

use jv_core::{MemoryEntry, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Minimum token length considered for tracing. Anything shorter is a
/// stopword-sized fragment ("the", "and", "not") that would let a
/// hallucinated item trace to almost any corpus.
const MIN_TOKEN_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReflectError {
    /// The provider produced no assistant content at all.
    #[error("no_assistant_output")]
    NoAssistantOutput,

    /// Assistant content was present but not a JSON object of the
    /// expected shape.
    #[error("invalid_json")]
    InvalidJson,

    /// An item could not be traced back to the provided inputs.
    #[error("validation_failed: {detail}")]
    ValidationFailed { detail: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroppedItem {
    pub value: String,
    pub reason: String,
}

/// The reflection object a provider must return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub current_objective: String,
    #[serde(default)]
    pub open_hypotheses: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub unresolved_questions: Vec<String>,
    #[serde(default)]
    pub required_evidence_links: Vec<String>,
    #[serde(default)]
    pub dropped: Vec<DroppedItem>,
}

/// Inputs the reflection is built from — and validated against.
pub struct ReflectInputs<'a> {
    pub objective: &'a str,
    pub memory: &'a [MemoryEntry],
    pub tasks: &'a [Task],
    pub previous_snapshot: Option<&'a Value>,
}

/// Assemble the reflection prompt.
pub fn build_reflection_prompt(inputs: &ReflectInputs<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str("Reflect on the trajectory so far and respond with a single JSON object\n");
    prompt.push_str("with the fields: current_objective, open_hypotheses, blockers,\n");
    prompt.push_str("next_actions, unresolved_questions, required_evidence_links, and\n");
    prompt.push_str("dropped (a list of {value, reason}). Only restate facts present in\n");
    prompt.push_str("the inputs below; do not invent new ones.\n\n");

    prompt.push_str(&format!("## Objective\n{}\n", inputs.objective));

    if !inputs.memory.is_empty() {
        prompt.push_str("\n## Memory\n");
        for entry in inputs.memory {
            prompt.push_str(&format!("- [{}] {}: {}\n", entry.scope, entry.key, entry.value));
        }
    }

    if !inputs.tasks.is_empty() {
        prompt.push_str("\n## Tasks\n");
        for task in inputs.tasks {
            let title = task.title.as_deref().unwrap_or("");
            prompt.push_str(&format!("- {} ({}) {}\n", task.id, task.status, title));
        }
    }

    if let Some(snapshot) = inputs.previous_snapshot {
        prompt.push_str("\n## Previous reflection\n");
        prompt.push_str(&snapshot.to_string());
        prompt.push('\n');
    }

    prompt
}

/// Parse and validate the provider's reflection output.
pub fn parse_reflection(
    assistant_text: Option<&str>,
    inputs: &ReflectInputs<'_>,
) -> Result<Reflection, ReflectError> {
    let text = assistant_text.ok_or(ReflectError::NoAssistantOutput)?;
    if text.trim().is_empty() {
        return Err(ReflectError::NoAssistantOutput);
    }

    let json = extract_json_object(text).ok_or(ReflectError::InvalidJson)?;
    let reflection: Reflection =
        serde_json::from_str(json).map_err(|_| ReflectError::InvalidJson)?;

    let corpus = source_tokens(inputs);
    let mut check = |field: &str, item: &str| -> Result<(), ReflectError> {
        if traces_to(item, &corpus) {
            Ok(())
        } else {
            Err(ReflectError::ValidationFailed {
                detail: format!("{field} item has no source trace: {item:?}"),
            })
        }
    };

    check("current_objective", &reflection.current_objective)?;
    for item in &reflection.open_hypotheses {
        check("open_hypotheses", item)?;
    }
    for item in &reflection.blockers {
        check("blockers", item)?;
    }
    for item in &reflection.next_actions {
        check("next_actions", item)?;
    }
    for item in &reflection.unresolved_questions {
        check("unresolved_questions", item)?;
    }
    for item in &reflection.required_evidence_links {
        check("required_evidence_links", item)?;
    }
    for item in &reflection.dropped {
        check("dropped", &item.value)?;
    }

    Ok(reflection)
}

/// Find the JSON object in possibly-chatty assistant output.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn source_tokens(inputs: &ReflectInputs<'_>) -> HashSet<String> {
    let mut corpus = String::new();
    corpus.push_str(inputs.objective);
    corpus.push(' ');
    for entry in inputs.memory {
        corpus.push_str(&entry.key);
        corpus.push(' ');
        corpus.push_str(&entry.value.to_string());
        corpus.push(' ');
    }
    for task in inputs.tasks {
        corpus.push_str(&task.id);
        corpus.push(' ');
        if let Some(title) = &task.title {
            corpus.push_str(title);
            corpus.push(' ');
        }
        if let Some(summary) = &task.summary {
            corpus.push_str(summary);
            corpus.push(' ');
        }
    }
    if let Some(snapshot) = inputs.previous_snapshot {
        corpus.push_str(&snapshot.to_string());
    }
    tokenize(&corpus).collect()
}

/// An item traces when it shares a token of [`MIN_TOKEN_LEN`] or more
/// characters with the corpus. Items with no tokens long enough to check
/// pass vacuously.
fn traces_to(item: &str, corpus: &HashSet<String>) -> bool {
    let mut had_token = false;
    for token in tokenize(item) {
        had_token = true;
        if corpus.contains(&token) {
            return true;
        }
    }
    !had_token
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
}

#[cfg(test)]
#[path = "reflect_tests.rs"]
mod tests;
