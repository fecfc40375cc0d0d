// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic file writes: temp + rename, with a delete-then-rename fallback.
//!
//! Readers interleaved with a writer observe either the prior or the next
//! content, never a truncated file. Secrets get `0600` before any bytes
//! are written.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Write text to `path` atomically.
pub fn write_text_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    write_atomic(path, text.as_bytes(), false)
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_atomic(path, &json, false)
}

/// Write a secret atomically with owner-only permissions.
pub fn write_secret_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    write_atomic(path, text.as_bytes(), true)
}

fn write_atomic(path: &Path, bytes: &[u8], secret: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    let result = write_then_rename(&tmp, path, bytes, secret);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8], secret: bool) -> std::io::Result<()> {
    let mut file = open_temp(tmp, secret)?;
    file.write_all(bytes)?;
    // Best-effort durability; rename is the atomicity boundary.
    let _ = file.sync_all();
    drop(file);

    match fs::rename(tmp, path) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Windows refuses to rename over an existing file, and a
            // cross-device tempdir fails the same way. Delete and retry.
            let _ = fs::remove_file(path);
            fs::rename(tmp, path)
        }
    }
}

#[cfg(unix)]
fn open_temp(tmp: &Path, secret: bool) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    if secret {
        options.mode(0o600);
    }
    options.open(tmp)
}

#[cfg(not(unix))]
fn open_temp(tmp: &Path, _secret: bool) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(tmp)
}

/// Sibling temp name: `.{name}.{pid}.{nanos}.tmp` keeps the rename on the
/// same filesystem and makes stragglers attributable.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let tmp_name = format!(".{}.{}.{}.tmp", name, std::process::id(), nanos);
    path.with_file_name(tmp_name)
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
