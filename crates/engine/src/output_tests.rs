// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::summarize::RESPONSE_CHAR_CAP;
use serde_json::json;

fn writer(dir: &tempfile::TempDir, clock: TestClock) -> OutputWriter<TestClock> {
    OutputWriter::with_clock(dir.path().join("output.json"), dir.path().join("raw"), clock)
}

fn tool_use(id: &str, name: &str) -> ProviderEvent {
    ProviderEvent::ToolUse {
        tool_use_id: id.to_string(),
        name: name.to_string(),
        input: json!({"q": "x"}),
        extra: Default::default(),
    }
}

fn tool_result(id: &str, content: Value, is_error: bool) -> ProviderEvent {
    ProviderEvent::ToolResult {
        tool_use_id: id.to_string(),
        content,
        is_error,
        extra: Default::default(),
    }
}

fn read_doc(dir: &tempfile::TempDir) -> SdkDocument {
    serde_json::from_str(&std::fs::read_to_string(dir.path().join("output.json")).unwrap())
        .unwrap()
}

#[test]
fn schema_tag_and_session_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = writer(&dir, TestClock::new());

    writer
        .record(&ProviderEvent::System {
            session_id: Some("sess-99".to_string()),
            extra: Default::default(),
        })
        .unwrap();
    writer.finalize(true, None).unwrap();

    let doc = read_doc(&dir);
    assert_eq!(doc.schema, SDK_SCHEMA);
    assert_eq!(doc.session_id, "sess-99");
    assert!(doc.ended_at.is_some());
    assert!(doc.success);
}

#[test]
fn first_record_writes_immediately_then_debounces() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::new();
    let mut writer = writer(&dir, clock.clone());

    writer
        .record(&ProviderEvent::Assistant { content: json!("one"), extra: Default::default() })
        .unwrap();
    assert_eq!(read_doc(&dir).messages.len(), 1);

    // Within the debounce window: the artifact does not change yet.
    clock.advance(std::time::Duration::from_millis(100));
    writer
        .record(&ProviderEvent::Assistant { content: json!("two"), extra: Default::default() })
        .unwrap();
    assert_eq!(read_doc(&dir).messages.len(), 1);
    assert!(writer.dirty());

    // Past the window the next record flushes everything.
    clock.advance(WRITE_DEBOUNCE);
    writer
        .record(&ProviderEvent::Assistant { content: json!("three"), extra: Default::default() })
        .unwrap();
    assert_eq!(read_doc(&dir).messages.len(), 3);
}

#[test]
fn finalize_forces_the_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::new();
    let mut writer = writer(&dir, clock.clone());

    writer
        .record(&ProviderEvent::Assistant { content: json!("one"), extra: Default::default() })
        .unwrap();
    clock.advance(std::time::Duration::from_millis(10));
    writer
        .record(&ProviderEvent::Assistant { content: json!("two"), extra: Default::default() })
        .unwrap();
    writer.finalize(false, Some(("provider timed out", "timeout"))).unwrap();

    let doc = read_doc(&dir);
    assert_eq!(doc.messages.len(), 2);
    assert!(!doc.success);
    assert_eq!(doc.error.as_deref(), Some("provider timed out"));
    assert_eq!(doc.error_type.as_deref(), Some("timeout"));
    assert_eq!(doc.stats.num_turns, Some(2));
}

#[test]
fn tool_result_updates_entry_in_place_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::new();
    let mut writer = writer(&dir, clock.clone());

    writer.record(&tool_use("t1", "grep")).unwrap();
    writer.record(&tool_use("t2", "read")).unwrap();
    clock.advance(std::time::Duration::from_millis(250));
    // Results arrive out of order; each updates its own entry.
    writer.record(&tool_result("t2", json!("file contents"), false)).unwrap();
    writer.record(&tool_result("t1", json!("no matches"), true)).unwrap();
    writer.finalize(true, None).unwrap();

    let doc = read_doc(&dir);
    assert_eq!(doc.tool_calls.len(), 2);
    assert_eq!(doc.stats.tool_call_count, 2);

    let t1 = doc.tool_calls.iter().find(|t| t.tool_use_id == "t1").unwrap();
    assert_eq!(t1.is_error, Some(true));
    assert_eq!(t1.response_text.as_deref(), Some("no matches"));
    assert_eq!(t1.duration_ms, Some(250));

    let t2 = doc.tool_calls.iter().find(|t| t.tool_use_id == "t2").unwrap();
    assert_eq!(t2.is_error, Some(false));
    assert_eq!(t2.response_text.as_deref(), Some("file contents"));
}

#[test]
fn unmatched_tool_result_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = writer(&dir, TestClock::new());
    let event = writer.record(&tool_result("ghost", json!("x"), false)).unwrap();
    assert!(event.is_none());
}

#[test]
fn oversized_response_is_summarized_with_handle() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = writer(&dir, TestClock::new());

    let raw = format!("error: boom in src/lib.rs:7\n{}", "x".repeat(RESPONSE_CHAR_CAP + 10));
    writer.record(&tool_use("t1", "bash")).unwrap();
    writer.record(&tool_result("t1", json!(raw), false)).unwrap();
    writer.finalize(true, None).unwrap();

    let doc = read_doc(&dir);
    let call = &doc.tool_calls[0];
    assert_eq!(call.response_truncated, Some(true));

    let compression = call.compression.as_ref().unwrap();
    assert_eq!(compression.mode, "extractive");
    assert_eq!(compression.raw_char_count, raw.len());

    // The raw original is retrievable through the handle.
    let handle = call.retrieval_handle.as_ref().unwrap();
    assert_eq!(std::fs::read_to_string(handle).unwrap(), raw);
}

#[test]
fn usage_events_accumulate_stats() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = writer(&dir, TestClock::new());

    for _ in 0..2 {
        writer
            .record(&ProviderEvent::Usage {
                input_tokens: Some(100),
                output_tokens: Some(10),
                cache_read_input_tokens: None,
                cache_creation_input_tokens: None,
                total_cost_usd: Some(0.25),
                extra: Default::default(),
            })
            .unwrap();
    }
    writer.finalize(true, None).unwrap();

    let doc = read_doc(&dir);
    assert_eq!(doc.stats.input_tokens, Some(200));
    assert_eq!(doc.stats.output_tokens, Some(20));
    assert_eq!(doc.stats.total_cost_usd, Some(0.5));
}

#[test]
fn record_returns_matching_hub_events() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = writer(&dir, TestClock::new());

    let event = writer.record(&tool_use("t1", "grep")).unwrap().unwrap();
    assert!(matches!(event, jv_core::HubEvent::SdkToolStart { ref tool_use_id, .. } if tool_use_id == "t1"));

    let event = writer.record(&tool_result("t1", json!("ok"), false)).unwrap().unwrap();
    assert!(matches!(event, jv_core::HubEvent::SdkToolComplete { ref tool_use_id, is_error: false, .. } if tool_use_id == "t1"));

    let event = writer
        .record(&ProviderEvent::Result { success: true, error: None, extra: Default::default() })
        .unwrap()
        .unwrap();
    assert!(matches!(event, jv_core::HubEvent::SdkComplete { ref status, .. } if status == "success"));
}
