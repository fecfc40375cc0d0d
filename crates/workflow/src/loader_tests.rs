// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::DEFAULT_ALLOWED_WRITES;

#[test]
fn loads_minimal_workflow() {
    let wf = load_workflow(
        r#"
name: minimal
start: work
phases:
  work:
    type: execute
    prompt: "Fix the issue"
    transitions:
      - to: done
  done:
    type: terminal
"#,
    )
    .unwrap();
    assert_eq!(wf.name, "minimal");
    assert_eq!(wf.version, 1);
    assert_eq!(wf.start, "work");
    assert_eq!(wf.phases.len(), 2);
}

#[test]
fn phases_keep_declaration_order() {
    let wf = load_workflow(
        r#"
name: ordered
start: zeta
phases:
  zeta:
    type: execute
    prompt: p
  alpha:
    type: terminal
"#,
    )
    .unwrap();
    let names: Vec<&str> = wf.phases.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
}

#[test]
fn allowed_writes_defaults_to_state_dir_glob() {
    let wf = load_workflow(
        r#"
name: defaults
start: work
phases:
  work:
    type: execute
    prompt: p
"#,
    )
    .unwrap();
    assert_eq!(wf.phases["work"].allowed_writes, vec![DEFAULT_ALLOWED_WRITES.to_string()]);
}

#[test]
fn rejects_undeclared_start() {
    let err = load_workflow(
        r#"
name: bad
start: ghost
phases:
  work:
    type: terminal
"#,
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownStart { start, .. } if start == "ghost"));
}

#[test]
fn rejects_unknown_transition_target() {
    let err = load_workflow(
        r#"
name: bad
start: work
phases:
  work:
    type: execute
    prompt: p
    transitions:
      - to: nowhere
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, WorkflowError::UnknownTarget { phase, to, .. } if phase == "work" && to == "nowhere")
    );
}

#[yare::parameterized(
    execute = { "execute" },
    evaluate = { "evaluate" },
)]
fn rejects_provider_phase_without_prompt(kind: &str) {
    let yaml = format!(
        r#"
name: bad
start: work
phases:
  work:
    type: {kind}
"#
    );
    let err = load_workflow(&yaml).unwrap_err();
    assert!(matches!(err, WorkflowError::MissingPrompt { phase, .. } if phase == "work"));
}

#[test]
fn rejects_blank_prompt() {
    let err = load_workflow(
        r#"
name: bad
start: work
phases:
  work:
    type: execute
    prompt: "   "
"#,
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::MissingPrompt { .. }));
}

#[test]
fn rejects_script_phase_without_command() {
    let err = load_workflow(
        r#"
name: bad
start: work
phases:
  work:
    type: script
"#,
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::MissingCommand { phase, .. } if phase == "work"));
}

#[test]
fn rejects_terminal_phase_with_transitions() {
    let err = load_workflow(
        r#"
name: bad
start: done
phases:
  done:
    type: terminal
    transitions:
      - to: done
"#,
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::TerminalWithTransitions { phase, .. } if phase == "done"));
}

#[test]
fn rejects_malformed_yaml() {
    assert!(matches!(load_workflow("name: [unclosed"), Err(WorkflowError::Yaml(_))));
}

#[test]
fn parsed_workflow_round_trips_through_json() {
    let wf = load_workflow(
        r#"
name: round-trip
start: work
phases:
  work:
    type: script
    command: "cargo test"
    transitions:
      - to: done
        when: status.testsGreen == true
        priority: 2
  done:
    type: terminal
"#,
    )
    .unwrap();
    let json = serde_json::to_value(&wf).unwrap();
    let back: Workflow = serde_json::from_value(json).unwrap();
    assert_eq!(back, wf);
}
