// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn fixture() -> (tempfile::TempDir, ProjectFiles) {
    let dir = tempfile::tempdir().unwrap();
    let files = ProjectFiles::new(dir.path().join("repo-files/acme/widgets"));
    (dir, files)
}

#[test]
fn empty_registry_lists_nothing() {
    let (_dir, files) = fixture();
    assert!(files.list().unwrap().is_empty());
}

#[test]
fn upsert_creates_record_and_blob() {
    let (_dir, files) = fixture();
    let record = files.upsert("Connection config", "secrets/conn.cfg", b"token=x", false).unwrap();

    assert_eq!(record.id, 1);
    assert_eq!(record.target_path, "secrets/conn.cfg");
    assert_eq!(record.size_bytes, 7);
    assert_eq!(record.sha256.len(), 64);

    assert_eq!(files.read_blob(&record).unwrap(), b"token=x");
    assert_eq!(files.list().unwrap(), vec![record]);
}

#[test]
fn ids_are_not_reused_after_delete() {
    let (_dir, files) = fixture();
    let first = files.upsert("a", "a.txt", b"1", false).unwrap();
    files.delete(first.id).unwrap();
    let second = files.upsert("b", "b.txt", b"2", false).unwrap();
    assert_eq!(second.id, 2);
}

#[test]
fn duplicate_target_path_is_a_conflict() {
    let (_dir, files) = fixture();
    files.upsert("a", "same.txt", b"1", false).unwrap();
    let err = files.upsert("b", "same.txt", b"2", false).unwrap_err();
    assert_eq!(err.code(), "TARGET_PATH_EXISTS");
}

#[test]
fn replace_updates_content_in_place() {
    let (_dir, files) = fixture();
    let original = files.upsert("a", "same.txt", b"1", false).unwrap();
    let replaced = files.upsert("renamed", "same.txt", b"22", true).unwrap();

    assert_eq!(replaced.id, original.id);
    assert_eq!(replaced.display_name, "renamed");
    assert_eq!(replaced.size_bytes, 2);
    assert_ne!(replaced.sha256, original.sha256);
    assert_eq!(files.read_blob(&replaced).unwrap(), b"22");
    assert_eq!(files.list().unwrap().len(), 1);
}

#[test]
fn cap_is_enforced() {
    let (_dir, files) = fixture();
    for i in 0..FILE_CAP {
        files.upsert("f", &format!("f{i}.txt"), b"x", false).unwrap();
    }
    let err = files.upsert("overflow", "overflow.txt", b"x", false).unwrap_err();
    assert_eq!(err.code(), "FILE_CAP_EXCEEDED");
}

#[test]
fn delete_removes_record_and_blob() {
    let (_dir, files) = fixture();
    let record = files.upsert("a", "a.txt", b"1", false).unwrap();
    let blob = files.repo_files_dir().join(&record.storage_relpath);
    assert!(blob.exists());

    files.delete(record.id).unwrap();
    assert!(files.list().unwrap().is_empty());
    assert!(!blob.exists());
}

#[test]
fn delete_unknown_id_is_not_found() {
    let (_dir, files) = fixture();
    let err = files.delete(99).unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[yare::parameterized(
    empty = { "" },
    absolute = { "/etc/passwd" },
    traversal = { "../outside.txt" },
)]
fn unsafe_target_paths_are_rejected(target: &str) {
    let (_dir, files) = fixture();
    let err = files.upsert("bad", target, b"x", false).unwrap_err();
    assert_eq!(err.kind(), "validation");
}
