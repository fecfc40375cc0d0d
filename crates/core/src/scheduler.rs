// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task DAG validation and deterministic ready-set selection.
//!
//! Validation runs three steps in order: unique ids, references resolve,
//! acyclic. The cycle check is a three-colour DFS over source order, so the
//! reported cycle path is deterministic for a given input.

use crate::task::{Task, TaskStatus};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Typed scheduler failures, carrying the offending ids.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("duplicate task id: {id}")]
    DuplicateId { id: String },

    #[error("task {id} depends on unknown task {missing}")]
    MissingDependency { id: String, missing: String },

    #[error("dependency cycle: {}", path.join(" -> "))]
    CycleDetected {
        /// The tasks forming the cycle, in dependency order. The last
        /// entry depends back on the first.
        path: Vec<String>,
    },
}

impl SchedulerError {
    /// Stable machine-readable code for the wire layer.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::DuplicateId { .. } => "DUPLICATE_ID",
            SchedulerError::MissingDependency { .. } => "MISSING_DEPENDENCY",
            SchedulerError::CycleDetected { .. } => "CYCLE_DETECTED",
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Validate a task graph: unique ids, resolvable dependencies, acyclic.
pub fn validate_graph(tasks: &[Task]) -> Result<(), SchedulerError> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(SchedulerError::DuplicateId { id: task.id.clone() });
        }
    }

    let by_id: HashMap<&str, &Task> =
        tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    for task in tasks {
        for dep in &task.depends_on {
            if !by_id.contains_key(dep.as_str()) {
                return Err(SchedulerError::MissingDependency {
                    id: task.id.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }

    let mut colour: HashMap<&str, Colour> =
        tasks.iter().map(|t| (t.id.as_str(), Colour::White)).collect();
    let mut stack: Vec<&str> = Vec::new();
    for task in tasks {
        if colour.get(task.id.as_str()) == Some(&Colour::White) {
            if let Some(cycle) = visit(task.id.as_str(), &by_id, &mut colour, &mut stack) {
                return Err(SchedulerError::CycleDetected { path: cycle });
            }
        }
    }

    Ok(())
}

/// DFS visit. Returns the cycle path when a grey node is re-entered.
fn visit<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a Task>,
    colour: &mut HashMap<&'a str, Colour>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    colour.insert(id, Colour::Grey);
    stack.push(id);

    if let Some(task) = by_id.get(id) {
        for dep in &task.depends_on {
            match colour.get(dep.as_str()) {
                Some(Colour::Grey) => {
                    // Cut the stack at the first occurrence of the grey node
                    // so the path is exactly the cycle.
                    let start = stack.iter().position(|s| *s == dep.as_str()).unwrap_or(0);
                    return Some(stack[start..].iter().map(|s| s.to_string()).collect());
                }
                Some(Colour::White) => {
                    // References were validated above, so the lookup resolves.
                    if let Some(cycle) = visit(dep.as_str(), by_id, colour, stack) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }
    }

    stack.pop();
    colour.insert(id, Colour::Black);
    None
}

/// Select the deterministic ready set, up to `max_parallel` tasks.
///
/// Validates the graph first. A task is ready iff its own status is
/// retryable (`pending` or `failed`) and every dependency is `passed`.
/// Ordering: failed before pending, then source index, then id.
pub fn select_ready(tasks: &[Task], max_parallel: usize) -> Result<Vec<Task>, SchedulerError> {
    validate_graph(tasks)?;

    let status_by_id: HashMap<&str, TaskStatus> =
        tasks.iter().map(|t| (t.id.as_str(), t.status)).collect();

    let mut ready: Vec<(u8, usize, &Task)> = tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| {
            task.status.is_retryable()
                && task
                    .depends_on
                    .iter()
                    .all(|dep| status_by_id.get(dep.as_str()) == Some(&TaskStatus::Passed))
        })
        .map(|(index, task)| (task.status.ready_rank(), index, task))
        .collect();

    ready.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then_with(|| a.2.id.cmp(&b.2.id))
    });

    Ok(ready.into_iter().take(max_parallel).map(|(_, _, t)| t.clone()).collect())
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
