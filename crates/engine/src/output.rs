// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The canonical per-run output artifact (`jeeves.sdk.v1`), built
//! incrementally from provider events.
//!
//! One writer per run. Writes are debounced; `finalize` always forces a
//! write. A `tool_result` updates its `tool_use` entry in place by id.

use crate::summarize::{self, Compression};
use jv_core::{HubEvent, SessionId};
use jv_provider::ProviderEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Schema tag on every artifact.
pub const SDK_SCHEMA: &str = "jeeves.sdk.v1";

/// Debounce window between incremental writes.
pub const WRITE_DEBOUNCE: Duration = Duration::from_millis(750);

/// Source of monotonic instants for debouncing and tool durations.
///
/// The writer takes this as a type parameter so debounce tests can step
/// time instead of sleeping through real windows.
pub trait DebounceClock: Send {
    fn now(&self) -> Instant;
}

/// Real time.
#[derive(Clone, Copy, Default)]
pub struct WallClock;

impl DebounceClock for WallClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually-stepped clock shared between a test and its writer.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct TestClock(std::sync::Arc<parking_lot::Mutex<Instant>>);

#[cfg(test)]
impl TestClock {
    pub(crate) fn new() -> Self {
        Self(std::sync::Arc::new(parking_lot::Mutex::new(Instant::now())))
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

#[cfg(test)]
impl DebounceClock for TestClock {
    fn now(&self) -> Instant {
        *self.0.lock()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    pub content: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkToolCall {
    pub name: String,
    pub input: Value,
    pub tool_use_id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    /// Path of the out-of-band raw response, when one was persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_handle: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkStats {
    pub message_count: usize,
    pub tool_call_count: usize,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdkDocument {
    pub schema: String,
    pub session_id: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub success: bool,
    pub messages: Vec<SdkMessage>,
    pub tool_calls: Vec<SdkToolCall>,
    pub stats: SdkStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Builds and persists one run's artifact.
pub struct OutputWriter<C: DebounceClock = WallClock> {
    path: PathBuf,
    raw_dir: PathBuf,
    doc: SdkDocument,
    clock: C,
    started: Instant,
    last_write: Option<Instant>,
    dirty: bool,
    open_tools: HashMap<String, (usize, Instant)>,
}

impl OutputWriter<WallClock> {
    /// Writer for `path`, with raw out-of-band responses beside it.
    pub fn new(path: impl Into<PathBuf>, raw_dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, raw_dir, WallClock)
    }
}

impl<C: DebounceClock> OutputWriter<C> {
    pub fn with_clock(path: impl Into<PathBuf>, raw_dir: impl Into<PathBuf>, clock: C) -> Self {
        let started_at = now_rfc3339();
        Self {
            path: path.into(),
            raw_dir: raw_dir.into(),
            doc: SdkDocument {
                schema: SDK_SCHEMA.to_string(),
                session_id: SessionId::generate().to_string(),
                started_at,
                ..Default::default()
            },
            started: clock.now(),
            clock,
            last_write: None,
            dirty: false,
            open_tools: HashMap::new(),
        }
    }

    pub fn document(&self) -> &SdkDocument {
        &self.doc
    }

    /// Fold one provider event into the artifact. Returns the hub event
    /// observers should see, if the event maps to one.
    pub fn record(&mut self, event: &ProviderEvent) -> std::io::Result<Option<HubEvent>> {
        let hub_event = self.apply(event)?;
        self.dirty = true;
        self.maybe_flush()?;
        Ok(hub_event)
    }

    fn apply(&mut self, event: &ProviderEvent) -> std::io::Result<Option<HubEvent>> {
        let timestamp = now_rfc3339();
        match event {
            ProviderEvent::System { session_id, .. } => {
                if let Some(id) = session_id {
                    self.doc.session_id = id.clone();
                }
                Ok(Some(HubEvent::SdkInit {
                    session_id: self.doc.session_id.clone(),
                    started_at: self.doc.started_at.clone(),
                    status: "running".to_string(),
                }))
            }

            ProviderEvent::User { content, .. } | ProviderEvent::Assistant { content, .. } => {
                let kind = match event {
                    ProviderEvent::User { .. } => "user",
                    _ => "assistant",
                };
                self.doc.messages.push(SdkMessage {
                    kind: kind.to_string(),
                    timestamp,
                    content: content.clone(),
                });
                self.doc.stats.message_count = self.doc.messages.len();
                let index = self.doc.messages.len() - 1;
                Ok(Some(HubEvent::SdkMessage {
                    message: content.clone(),
                    index,
                    total: self.doc.messages.len(),
                }))
            }

            ProviderEvent::ToolUse { tool_use_id, name, input, .. } => {
                self.doc.tool_calls.push(SdkToolCall {
                    name: name.clone(),
                    input: input.clone(),
                    tool_use_id: tool_use_id.clone(),
                    timestamp,
                    ..Default::default()
                });
                self.doc.stats.tool_call_count = self.doc.tool_calls.len();
                self.open_tools
                    .insert(tool_use_id.clone(), (self.doc.tool_calls.len() - 1, self.clock.now()));
                Ok(Some(HubEvent::SdkToolStart {
                    tool_use_id: tool_use_id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }))
            }

            ProviderEvent::ToolResult { tool_use_id, content, is_error, .. } => {
                let Some((index, started)) = self.open_tools.remove(tool_use_id) else {
                    tracing::debug!(tool_use_id, "tool result without matching tool use");
                    return Ok(None);
                };
                let duration_ms = self.clock.now().duration_since(started).as_millis() as u64;
                let raw = match content {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };

                let (response_text, truncated, compression, retrieval_handle) =
                    if summarize::needs_summary(&raw) {
                        let handle = self.persist_raw(tool_use_id, &raw)?;
                        let summarized = summarize::summarize(&raw);
                        (summarized.text, true, Some(summarized.compression), Some(handle))
                    } else {
                        (raw, false, None, None)
                    };

                // Update in place, keyed by tool_use_id.
                if let Some(entry) = self.doc.tool_calls.get_mut(index) {
                    entry.duration_ms = Some(duration_ms);
                    entry.is_error = Some(*is_error);
                    entry.response_text = Some(response_text.clone());
                    entry.response_truncated = Some(truncated);
                    entry.compression = compression;
                    entry.retrieval_handle = retrieval_handle;

                    Ok(Some(HubEvent::SdkToolComplete {
                        tool_use_id: tool_use_id.clone(),
                        name: entry.name.clone(),
                        duration_ms: Some(duration_ms),
                        is_error: *is_error,
                        response_text: Some(response_text),
                        response_truncated: truncated,
                    }))
                } else {
                    Ok(None)
                }
            }

            ProviderEvent::Usage {
                input_tokens,
                output_tokens,
                cache_read_input_tokens,
                cache_creation_input_tokens,
                total_cost_usd,
                ..
            } => {
                let stats = &mut self.doc.stats;
                accumulate(&mut stats.input_tokens, *input_tokens);
                accumulate(&mut stats.output_tokens, *output_tokens);
                accumulate(&mut stats.cache_read_input_tokens, *cache_read_input_tokens);
                accumulate(&mut stats.cache_creation_input_tokens, *cache_creation_input_tokens);
                if let Some(cost) = total_cost_usd {
                    *stats.total_cost_usd.get_or_insert(0.0) += cost;
                }
                Ok(None)
            }

            ProviderEvent::Result { success, error, .. } => {
                self.doc.success = *success;
                if let Some(message) = error {
                    self.doc.error = Some(message.clone());
                    self.doc.error_type = Some("provider_reported".to_string());
                }
                Ok(Some(HubEvent::SdkComplete {
                    status: if *success { "success".to_string() } else { "error".to_string() },
                    summary: error.clone(),
                }))
            }
        }
    }

    /// Persist a raw oversized response under a retrieval handle.
    fn persist_raw(&self, tool_use_id: &str, raw: &str) -> std::io::Result<String> {
        let path = self.raw_dir.join(format!("tool-{tool_use_id}.txt"));
        jv_store::atomic::write_text_atomic(&path, raw)?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn maybe_flush(&mut self) -> std::io::Result<()> {
        let due = match self.last_write {
            None => true,
            Some(last) => self.clock.now().duration_since(last) >= WRITE_DEBOUNCE,
        };
        if due {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.doc.stats.duration_seconds =
            self.clock.now().duration_since(self.started).as_secs_f64();
        jv_store::atomic::write_json_atomic(&self.path, &self.doc)?;
        self.last_write = Some(self.clock.now());
        self.dirty = false;
        Ok(())
    }

    /// True when changes have accumulated since the last write.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Force the final write. `error` overrides any provider-reported
    /// error (e.g. timeout or cancellation).
    pub fn finalize(
        &mut self,
        success: bool,
        error: Option<(&str, &str)>,
    ) -> std::io::Result<()> {
        self.doc.success = success;
        if let Some((message, error_type)) = error {
            self.doc.error = Some(message.to_string());
            self.doc.error_type = Some(error_type.to_string());
        }
        self.doc.ended_at = Some(now_rfc3339());
        self.doc.stats.num_turns = Some(self.doc.messages.len() as u32);
        self.flush()
    }
}

fn accumulate(slot: &mut Option<u64>, value: Option<u64>) {
    if let Some(v) = value {
        *slot.get_or_insert(0) += v;
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
