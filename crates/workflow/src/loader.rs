// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow YAML loading and structural validation.

use crate::model::{PhaseType, Workflow};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("workflow {workflow}: start phase {start} is not declared")]
    UnknownStart { workflow: String, start: String },

    #[error("workflow {workflow}: phase {phase} transitions to unknown phase {to}")]
    UnknownTarget { workflow: String, phase: String, to: String },

    #[error("workflow {workflow}: {kind} phase {phase} requires a prompt")]
    MissingPrompt { workflow: String, phase: String, kind: PhaseType },

    #[error("workflow {workflow}: script phase {phase} requires a command")]
    MissingCommand { workflow: String, phase: String },

    #[error("workflow {workflow}: terminal phase {phase} declares transitions")]
    TerminalWithTransitions { workflow: String, phase: String },
}

/// Parse a workflow document without validating it.
pub fn parse_workflow(yaml: &str) -> Result<Workflow, WorkflowError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Check the structural invariants of a parsed workflow.
pub fn validate(workflow: &Workflow) -> Result<(), WorkflowError> {
    let name = &workflow.name;

    if !workflow.phases.contains_key(&workflow.start) {
        return Err(WorkflowError::UnknownStart {
            workflow: name.clone(),
            start: workflow.start.clone(),
        });
    }

    for (phase_name, phase) in &workflow.phases {
        match phase.phase_type {
            PhaseType::Execute | PhaseType::Evaluate => {
                if phase.prompt.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(WorkflowError::MissingPrompt {
                        workflow: name.clone(),
                        phase: phase_name.clone(),
                        kind: phase.phase_type,
                    });
                }
            }
            PhaseType::Script => {
                if phase.command.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(WorkflowError::MissingCommand {
                        workflow: name.clone(),
                        phase: phase_name.clone(),
                    });
                }
            }
            PhaseType::Terminal => {
                if !phase.transitions.is_empty() {
                    return Err(WorkflowError::TerminalWithTransitions {
                        workflow: name.clone(),
                        phase: phase_name.clone(),
                    });
                }
            }
        }

        for transition in &phase.transitions {
            if !workflow.phases.contains_key(&transition.to) {
                return Err(WorkflowError::UnknownTarget {
                    workflow: name.clone(),
                    phase: phase_name.clone(),
                    to: transition.to.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Parse and validate a workflow document.
pub fn load_workflow(yaml: &str) -> Result<Workflow, WorkflowError> {
    let workflow = parse_workflow(yaml)?;
    validate(&workflow)?;
    Ok(workflow)
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
