// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provider event envelope: line-delimited JSON tagged by `type`.
//!
//! Providers differ wildly in what they put inside each event; the typed
//! fields below are the ones this system acts on, and everything else
//! rides along in the flattened `extra` map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured event from an agent subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    User {
        #[serde(default)]
        content: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Assistant {
        #[serde(default)]
        content: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ToolUse {
        tool_use_id: String,
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Usage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_read_input_tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_creation_input_tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Result {
        #[serde(default)]
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl ProviderEvent {
    /// Assistant text content, when this is an assistant event carrying
    /// plain text (string content or `[{type: text, text}]` blocks).
    pub fn assistant_text(&self) -> Option<String> {
        let ProviderEvent::Assistant { content, .. } = self else {
            return None;
        };
        match content {
            Value::String(s) => Some(s.clone()),
            Value::Array(blocks) => {
                let text: Vec<&str> = blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect();
                if text.is_empty() {
                    None
                } else {
                    Some(text.join("\n"))
                }
            }
            _ => None,
        }
    }
}

/// What the supervisor hands to consumers: structured events, plus raw
/// chunks for lines that are not protocol JSON. Only debug chunks may be
/// dropped under back-pressure.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Event(ProviderEvent),
    Debug(String),
}

/// Parse one output line. Blank lines yield `None`; anything that is not
/// a well-formed protocol event becomes a debug chunk.
pub fn parse_line(line: &str) -> Option<SupervisorEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<ProviderEvent>(trimmed) {
        Ok(event) => Some(SupervisorEvent::Event(event)),
        Err(_) => Some(SupervisorEvent::Debug(trimmed.to_string())),
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
