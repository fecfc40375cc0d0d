// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn fixture() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn upsert_then_list() {
    let (dir, store) = fixture();
    let state_dir = dir.path().join("wt/.jeeves");

    store
        .upsert_memory(&state_dir, MemoryScope::WorkingSet, "focus", &json!({"file": "a.rs"}), 1)
        .unwrap();

    let entries = store.list_memory(&state_dir, None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].scope, MemoryScope::WorkingSet);
    assert_eq!(entries[0].key, "focus");
    assert_eq!(entries[0].value, json!({"file": "a.rs"}));
    assert_eq!(entries[0].source_iteration, 1);
    assert!(!entries[0].stale);
}

#[test]
fn scope_key_is_unique_per_state_dir() {
    let (dir, store) = fixture();
    let state_dir = dir.path().join("wt/.jeeves");

    store.upsert_memory(&state_dir, MemoryScope::Decisions, "db", &json!("sqlite"), 1).unwrap();
    store.upsert_memory(&state_dir, MemoryScope::Decisions, "db", &json!("postgres"), 2).unwrap();

    let entries = store.list_memory(&state_dir, Some(MemoryScope::Decisions)).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value, json!("postgres"));
    assert_eq!(entries[0].source_iteration, 2);
}

#[test]
fn same_key_different_scope_coexists() {
    let (dir, store) = fixture();
    let state_dir = dir.path().join("wt/.jeeves");

    store.upsert_memory(&state_dir, MemoryScope::Session, "k", &json!(1), 1).unwrap();
    store.upsert_memory(&state_dir, MemoryScope::CrossRun, "k", &json!(2), 1).unwrap();

    assert_eq!(store.list_memory(&state_dir, None).unwrap().len(), 2);
    assert_eq!(store.list_memory(&state_dir, Some(MemoryScope::Session)).unwrap().len(), 1);
}

#[test]
fn mark_stale_is_a_soft_delete() {
    let (dir, store) = fixture();
    let state_dir = dir.path().join("wt/.jeeves");

    store.upsert_memory(&state_dir, MemoryScope::WorkingSet, "old", &json!(true), 1).unwrap();
    store.mark_memory_stale(&state_dir, MemoryScope::WorkingSet, "old").unwrap();

    let entries = store.list_memory(&state_dir, None).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].stale);
}

#[test]
fn mark_stale_missing_row_is_ok() {
    let (dir, store) = fixture();
    let state_dir = dir.path().join("wt/.jeeves");
    store.mark_memory_stale(&state_dir, MemoryScope::Session, "ghost").unwrap();
}

#[test]
fn upsert_revives_stale_entry() {
    let (dir, store) = fixture();
    let state_dir = dir.path().join("wt/.jeeves");

    store.upsert_memory(&state_dir, MemoryScope::WorkingSet, "k", &json!(1), 1).unwrap();
    store.mark_memory_stale(&state_dir, MemoryScope::WorkingSet, "k").unwrap();
    store.upsert_memory(&state_dir, MemoryScope::WorkingSet, "k", &json!(2), 3).unwrap();

    let entries = store.list_memory(&state_dir, None).unwrap();
    assert!(!entries[0].stale);
    assert_eq!(entries[0].value, json!(2));
}
