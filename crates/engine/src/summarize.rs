// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extractive summarisation of oversized tool responses.
//!
//! No model involved: the summary is assembled from error signatures,
//! file references, and leading lines pulled straight out of the raw
//! text, with a compression descriptor recording what happened.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Raw responses longer than this are summarised.
pub const RESPONSE_CHAR_CAP: usize = 2000;

/// Raw responses with more lines than this are summarised.
pub const RESPONSE_LINE_CAP: usize = 50;

/// How many leading lines the summary keeps.
const HEAD_LINES: usize = 10;

/// Caps on each extracted list.
const MAX_EXTRACTED: usize = 20;

#[allow(clippy::expect_used)]
static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|panic|exception|failed|fatal|warning)\b")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static FILE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_./\\-]*\.[A-Za-z0-9_]+(?::\d+(?::\d+)?)?")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static LINE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bline\s+\d+\b").expect("constant regex pattern is valid")
});

/// Descriptor attached to a summarised tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compression {
    pub mode: String,
    pub raw_char_count: usize,
    pub summary_char_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_summary: Option<serde_json::Value>,
}

/// A summary plus its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Summarized {
    pub text: String,
    pub compression: Compression,
}

/// Whether a raw response exceeds the char or line caps.
pub fn needs_summary(raw: &str) -> bool {
    raw.len() > RESPONSE_CHAR_CAP || raw.lines().count() > RESPONSE_LINE_CAP
}

/// Produce the extractive summary for an oversized response.
pub fn summarize(raw: &str) -> Summarized {
    let reason = if raw.len() > RESPONSE_CHAR_CAP {
        format!("{} chars exceeds cap of {RESPONSE_CHAR_CAP}", raw.len())
    } else {
        format!("{} lines exceeds cap of {RESPONSE_LINE_CAP}", raw.lines().count())
    };

    let error_signatures: Vec<String> = raw
        .lines()
        .filter(|line| ERROR_LINE.is_match(line))
        .map(|line| line.trim().to_string())
        .take(MAX_EXTRACTED)
        .collect();

    let mut file_refs: Vec<String> = Vec::new();
    for found in FILE_REF.find_iter(raw) {
        let text = found.as_str().to_string();
        if !file_refs.contains(&text) {
            file_refs.push(text);
        }
        if file_refs.len() >= MAX_EXTRACTED {
            break;
        }
    }

    let mut line_refs: Vec<String> = Vec::new();
    for found in LINE_REF.find_iter(raw) {
        let text = found.as_str().to_string();
        if !line_refs.contains(&text) {
            line_refs.push(text);
        }
        if line_refs.len() >= MAX_EXTRACTED {
            break;
        }
    }

    let head: Vec<&str> = raw.lines().take(HEAD_LINES).collect();

    let mut text = String::new();
    text.push_str(&head.join("\n"));
    if !error_signatures.is_empty() {
        text.push_str("\n-- error signatures --\n");
        text.push_str(&error_signatures.join("\n"));
    }
    if !file_refs.is_empty() {
        text.push_str("\n-- file references --\n");
        text.push_str(&file_refs.join("\n"));
    }
    text.truncate_to_char_boundary(RESPONSE_CHAR_CAP);

    let structured_summary = serde_json::json!({
        "error_signatures": error_signatures,
        "file_paths": file_refs,
        "line_refs": line_refs,
    });

    let compression = Compression {
        mode: "extractive".to_string(),
        raw_char_count: raw.len(),
        summary_char_count: text.len(),
        truncation_reason: Some(reason),
        structured_summary: Some(structured_summary),
    };

    Summarized { text, compression }
}

trait TruncateExt {
    fn truncate_to_char_boundary(&mut self, max: usize);
}

impl TruncateExt for String {
    fn truncate_to_char_boundary(&mut self, max: usize) {
        if self.len() <= max {
            return;
        }
        let mut end = max;
        while end > 0 && !self.is_char_boundary(end) {
            end -= 1;
        }
        self.truncate(end);
    }
}

#[cfg(test)]
#[path = "summarize_tests.rs"]
mod tests;
