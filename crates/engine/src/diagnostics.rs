// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool-usage diagnostics: hygiene and retrieval metrics derived from
//! the captured tool calls of one iteration, plus cross-iteration
//! accumulation.

use crate::output::SdkToolCall;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Duplicate-grep rate above this trips a warning.
const DUPLICATE_RATE_WARN: f64 = 0.3;

/// Grep calls without a single read above this trips a warning.
const GREP_WITHOUT_READ_WARN: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationDiagnostics {
    pub total_tool_calls: usize,
    pub grep_calls: usize,
    pub read_calls: usize,
    pub duplicate_grep_calls: usize,
    pub duplicate_query_rate: f64,
    pub locator_to_read_ratio: f64,
    pub truncated_tool_results_count: usize,
    pub retrieval_handle_generated_count: usize,
    pub retrieval_handle_resolved_count: usize,
    pub unresolved_handle_count: usize,
    pub raw_output_referenced_after_summary_count: usize,
    pub duplicate_stale_context_reference_count: usize,
    pub warnings: Vec<String>,
}

/// Running totals across iterations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSummary {
    pub iterations: u32,
    pub total_tool_calls: usize,
    pub grep_calls: usize,
    pub read_calls: usize,
    pub duplicate_grep_calls: usize,
    pub truncated_tool_results_count: usize,
    pub retrieval_handle_generated_count: usize,
    pub retrieval_handle_resolved_count: usize,
    pub unresolved_handle_count: usize,
    pub max_duplicate_query_rate: f64,
    pub max_locator_to_read_ratio: f64,
}

/// Compute one iteration's diagnostics from its captured tool calls.
pub fn analyze_tool_calls(calls: &[SdkToolCall]) -> IterationDiagnostics {
    let mut diag = IterationDiagnostics { total_tool_calls: calls.len(), ..Default::default() };

    let mut grep_signatures: HashMap<(String, String), usize> = HashMap::new();
    let mut handles: Vec<String> = Vec::new();
    let mut resolved: HashSet<String> = HashSet::new();
    let mut handle_reference_counts: HashMap<String, usize> = HashMap::new();

    for call in calls {
        let name = call.name.to_lowercase();
        let is_grep = name.contains("grep") || name.contains("search");
        let is_read = name.contains("read") || name.contains("cat") || name.contains("open");

        if is_grep {
            diag.grep_calls += 1;
            let signature = grep_signature(call);
            let seen = grep_signatures.entry(signature).or_insert(0);
            if *seen > 0 {
                diag.duplicate_grep_calls += 1;
            }
            *seen += 1;
        } else if is_read {
            diag.read_calls += 1;
        }

        if call.response_truncated == Some(true) {
            diag.truncated_tool_results_count += 1;
        }

        // A later call whose input mentions a generated handle resolves it.
        let input_text = call.input.to_string();
        for handle in &handles {
            if input_text.contains(handle.as_str()) {
                diag.raw_output_referenced_after_summary_count += 1;
                let count = handle_reference_counts.entry(handle.clone()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    diag.duplicate_stale_context_reference_count += 1;
                }
                resolved.insert(handle.clone());
            }
        }

        if let Some(handle) = &call.retrieval_handle {
            diag.retrieval_handle_generated_count += 1;
            handles.push(handle.clone());
        }
    }

    diag.retrieval_handle_resolved_count = resolved.len();
    diag.unresolved_handle_count =
        diag.retrieval_handle_generated_count - diag.retrieval_handle_resolved_count;

    if diag.grep_calls > 0 {
        diag.duplicate_query_rate = diag.duplicate_grep_calls as f64 / diag.grep_calls as f64;
    }
    diag.locator_to_read_ratio = diag.grep_calls as f64 / diag.read_calls.max(1) as f64;

    if diag.duplicate_query_rate > DUPLICATE_RATE_WARN {
        diag.warnings.push(format!(
            "{:.0}% of grep queries repeat an earlier (pattern, path); reuse earlier results",
            diag.duplicate_query_rate * 100.0
        ));
    }
    if diag.read_calls == 0 && diag.grep_calls > GREP_WITHOUT_READ_WARN {
        diag.warnings.push(format!(
            "{} grep calls with no file reads; results are being located but never read",
            diag.grep_calls
        ));
    }
    if diag.unresolved_handle_count > 0 {
        diag.warnings.push(format!(
            "{} retrieval handle(s) generated but never read back",
            diag.unresolved_handle_count
        ));
    }

    diag
}

/// Fold one iteration into the running summary.
pub fn merge_summary(prev: &DiagnosticsSummary, curr: &IterationDiagnostics) -> DiagnosticsSummary {
    DiagnosticsSummary {
        iterations: prev.iterations + 1,
        total_tool_calls: prev.total_tool_calls + curr.total_tool_calls,
        grep_calls: prev.grep_calls + curr.grep_calls,
        read_calls: prev.read_calls + curr.read_calls,
        duplicate_grep_calls: prev.duplicate_grep_calls + curr.duplicate_grep_calls,
        truncated_tool_results_count: prev.truncated_tool_results_count
            + curr.truncated_tool_results_count,
        retrieval_handle_generated_count: prev.retrieval_handle_generated_count
            + curr.retrieval_handle_generated_count,
        retrieval_handle_resolved_count: prev.retrieval_handle_resolved_count
            + curr.retrieval_handle_resolved_count,
        unresolved_handle_count: prev.unresolved_handle_count + curr.unresolved_handle_count,
        max_duplicate_query_rate: prev.max_duplicate_query_rate.max(curr.duplicate_query_rate),
        max_locator_to_read_ratio: prev.max_locator_to_read_ratio.max(curr.locator_to_read_ratio),
    }
}

fn grep_signature(call: &SdkToolCall) -> (String, String) {
    let pattern = call
        .input
        .get("pattern")
        .or_else(|| call.input.get("query"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let path = call
        .input
        .get("path")
        .or_else(|| call.input.get("glob"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    (pattern, path)
}

#[cfg(test)]
#[path = "diagnostics_tests.rs"]
mod tests;
