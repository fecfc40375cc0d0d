// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

fn target(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

#[test]
fn writes_fresh_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = target(&dir, "out.txt");
    write_text_atomic(&path, "hello").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
}

#[test]
fn overwrites_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = target(&dir, "out.txt");
    write_text_atomic(&path, "one").unwrap();
    write_text_atomic(&path, "two").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "two");
}

#[test]
fn creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/c/out.txt");
    write_text_atomic(&path, "deep").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "deep");
}

#[test]
fn leaves_no_temp_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = target(&dir, "out.txt");
    write_text_atomic(&path, "x").unwrap();
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["out.txt".to_string()]);
}

#[test]
fn json_writer_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = target(&dir, "state.json");
    write_json_atomic(&path, &serde_json::json!({"phase": "review", "n": 3})).unwrap();
    let back: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(back["phase"], "review");
    assert_eq!(back["n"], 3);
}

#[cfg(unix)]
#[test]
fn secrets_get_owner_only_mode() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let path = target(&dir, "token");
    write_secret_atomic(&path, "s3cret").unwrap();
    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn reader_never_sees_partial_content() {
    // A reader racing the writer sees either the old or the new content.
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let path = Arc::new(target(&dir, "race.txt"));
    let old = "a".repeat(4096);
    let new = "b".repeat(4096);
    write_text_atomic(&path, &old).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let path = Arc::clone(&path);
        let stop = Arc::clone(&stop);
        let (old, new) = (old.clone(), new.clone());
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let content = fs::read_to_string(path.as_path()).unwrap();
                assert!(content == old || content == new, "observed torn write");
            }
        })
    };

    for _ in 0..50 {
        write_text_atomic(&path, &new).unwrap();
        write_text_atomic(&path, &old).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();
}
