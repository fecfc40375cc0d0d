// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn open_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let _store = Store::open(dir.path()).unwrap();
    assert!(dir.path().join("jeeves.db").exists());
}

#[test]
fn open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    drop(Store::open(dir.path()).unwrap());
    drop(Store::open(dir.path()).unwrap());
}

#[test]
fn migration_stamps_user_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let version: i32 = store
        .conn
        .lock()
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, 1);
}

#[test]
fn open_rejects_corrupt_database() {
    let dir = tempfile::tempdir().unwrap();
    // Valid header prefix followed by garbage: sqlite accepts the open
    // but quick_check (or the first schema read) reports corruption.
    let mut bytes = b"SQLite format 3\0".to_vec();
    bytes.extend(vec![0xAB_u8; 4096]);
    std::fs::write(dir.path().join("jeeves.db"), bytes).unwrap();

    assert!(Store::open(dir.path()).is_err());
}
