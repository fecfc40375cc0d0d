// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition selection and phase advancement.

use crate::guard::eval_guard;
use crate::model::{Phase, PhaseType, Transition, Workflow};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum phases an auto chain may enter in one evaluation. Guards
/// against `auto` transition loops in a workflow document.
pub const MAX_AUTO_CHAIN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown phase: {0}")]
    UnknownPhase(String),

    #[error("auto transition chain exceeded {MAX_AUTO_CHAIN} phases starting from {from}")]
    AutoLoop { from: String },
}

/// Outcome of evaluating the current phase against the status map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Phases entered, in order. The last entry is where the issue now
    /// stands; earlier entries were passed through by `auto` transitions.
    Moved { path: Vec<String> },
    /// No transition guard matched; the phase stands.
    NoTransition,
    /// The current phase is terminal.
    Terminal,
}

/// Guard expressions address the issue's status mapping as `status.*`,
/// so evaluation happens against a context that nests it under that key.
fn guard_context(status: &Map<String, Value>) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("status".to_string(), Value::Object(status.clone()));
    context
}

/// Pick the winning transition out of a phase, if any.
///
/// Transitions are tried in ascending priority (declaration order for
/// ties); the first whose guard evaluates true against the issue's
/// status mapping wins. A transition with no guard always matches.
pub fn select_transition<'a>(
    phase: &'a Phase,
    status: &Map<String, Value>,
) -> Option<&'a Transition> {
    let context = guard_context(status);
    phase
        .ordered_transitions()
        .into_iter()
        .find(|t| t.when.as_deref().map(|expr| eval_guard(expr, &context)).unwrap_or(true))
}

/// Advance from `from` as far as `auto` transitions carry.
///
/// One non-auto transition is taken at most; after that the engine pauses
/// for external drive. Terminal phases report [`AdvanceOutcome::Terminal`]
/// without moving.
pub fn advance(
    workflow: &Workflow,
    from: &str,
    status: &Map<String, Value>,
) -> Result<AdvanceOutcome, EngineError> {
    let mut current = workflow
        .phase(from)
        .ok_or_else(|| EngineError::UnknownPhase(from.to_string()))?;

    if current.phase_type == PhaseType::Terminal {
        return Ok(AdvanceOutcome::Terminal);
    }

    let mut path: Vec<String> = Vec::new();
    loop {
        let Some(transition) = select_transition(current, status) else {
            return if path.is_empty() {
                Ok(AdvanceOutcome::NoTransition)
            } else {
                Ok(AdvanceOutcome::Moved { path })
            };
        };

        if path.len() >= MAX_AUTO_CHAIN {
            return Err(EngineError::AutoLoop { from: from.to_string() });
        }

        let next = workflow
            .phase(&transition.to)
            .ok_or_else(|| EngineError::UnknownPhase(transition.to.clone()))?;
        tracing::debug!(to = %transition.to, auto = transition.auto, "transition selected");
        path.push(transition.to.clone());

        if !transition.auto || next.phase_type == PhaseType::Terminal {
            return Ok(AdvanceOutcome::Moved { path });
        }
        current = next;
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
