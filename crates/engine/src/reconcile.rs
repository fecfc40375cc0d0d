// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Projected-file reconciliation: keep a worktree's managed files in
//! sync with the blob store via symlinks (hard links where symlinks are
//! refused) and keep `.git/info/exclude` covering them.

use crate::files::ManagedFile;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InSync,
    DeferredWorktreeAbsent,
    FailedConflict,
    FailedLinkCreate,
    FailedSourceMissing,
    FailedExclude,
    NeverAttempted,
}

jv_core::wire_label! {
    SyncStatus {
        InSync => "in_sync",
        DeferredWorktreeAbsent => "deferred_worktree_absent",
        FailedConflict => "failed_conflict",
        FailedLinkCreate => "failed_link_create",
        FailedSourceMissing => "failed_source_missing",
        FailedExclude => "failed_exclude",
        NeverAttempted => "never_attempted",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ReconcileReport {
    fn ok() -> Self {
        Self { sync_status: SyncStatus::InSync, last_error: None }
    }

    fn failed(status: SyncStatus, error: impl Into<String>) -> Self {
        Self { sync_status: status, last_error: Some(error.into()) }
    }
}

pub struct ReconcileInputs<'a> {
    pub worktree_dir: &'a Path,
    pub repo_files_dir: &'a Path,
    pub files: &'a [ManagedFile],
    /// Target paths managed by the previous pass; anything no longer in
    /// the current set is removed.
    pub previous_managed_targets: &'a [String],
}

/// Reconcile the worktree against the managed-file set. Idempotent:
/// running twice with identical inputs leaves the worktree byte-identical.
pub fn reconcile(inputs: &ReconcileInputs<'_>) -> ReconcileReport {
    if !inputs.worktree_dir.is_dir() {
        return ReconcileReport {
            sync_status: SyncStatus::DeferredWorktreeAbsent,
            last_error: None,
        };
    }

    remove_stale(inputs);

    for file in inputs.files {
        let source = inputs.repo_files_dir.join(&file.storage_relpath);
        if !source.is_file() {
            return ReconcileReport::failed(
                SyncStatus::FailedSourceMissing,
                format!("blob missing for {}", file.target_path),
            );
        }

        let dest = inputs.worktree_dir.join(&file.target_path);
        match link_state(&dest, &source) {
            LinkState::Linked => {}
            LinkState::Conflict => {
                return ReconcileReport::failed(
                    SyncStatus::FailedConflict,
                    format!("{} exists and is not a link to its blob", file.target_path),
                );
            }
            LinkState::Absent => {
                if let Err(e) = create_link(&dest, &source) {
                    return ReconcileReport::failed(
                        SyncStatus::FailedLinkCreate,
                        format!("{}: {e}", file.target_path),
                    );
                }
            }
        }
    }

    let targets: Vec<&str> = inputs.files.iter().map(|f| f.target_path.as_str()).collect();
    if let Err(e) = maintain_exclude(inputs.worktree_dir, &targets) {
        return ReconcileReport::failed(SyncStatus::FailedExclude, e.to_string());
    }

    ReconcileReport::ok()
}

enum LinkState {
    /// Destination is already a symlink or hard link to the source.
    Linked,
    /// Destination exists but is something else.
    Conflict,
    Absent,
}

fn link_state(dest: &Path, source: &Path) -> LinkState {
    let Ok(metadata) = std::fs::symlink_metadata(dest) else {
        return LinkState::Absent;
    };

    if metadata.file_type().is_symlink() {
        return match std::fs::read_link(dest) {
            Ok(target) if target == source => LinkState::Linked,
            _ => LinkState::Conflict,
        };
    }

    if metadata.is_file() && is_hard_link_to(&metadata, source) {
        return LinkState::Linked;
    }

    LinkState::Conflict
}

#[cfg(unix)]
fn is_hard_link_to(dest_meta: &std::fs::Metadata, source: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match std::fs::metadata(source) {
        Ok(src_meta) => dest_meta.dev() == src_meta.dev() && dest_meta.ino() == src_meta.ino(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_hard_link_to(dest_meta: &std::fs::Metadata, source: &Path) -> bool {
    // Without inode identity, fall back to size equality; a conflict here
    // is reported rather than clobbered either way.
    std::fs::metadata(source).map(|src| src.len() == dest_meta.len()).unwrap_or(false)
}

fn create_link(dest: &Path, source: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match symlink(source, dest) {
        Ok(()) => Ok(()),
        // Typical on windows without developer mode: fall back to a hard
        // link to the same blob.
        Err(_) => std::fs::hard_link(source, dest),
    }
}

#[cfg(unix)]
fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, dest)
}

/// Ensure every managed target is listed in `.git/info/exclude`, once,
/// and drop lines for targets no longer managed by us.
fn maintain_exclude(worktree_dir: &Path, targets: &[&str]) -> std::io::Result<()> {
    let git_dir = worktree_dir.join(".git");
    if !git_dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "worktree has no .git directory",
        ));
    }

    let exclude_path = git_dir.join("info").join("exclude");
    let existing = std::fs::read_to_string(&exclude_path).unwrap_or_default();
    let wanted: HashSet<&str> = targets.iter().copied().collect();

    // Keep foreign lines, drop managed lines that fell out of the set,
    // then append whatever is missing.
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !looks_managed(line) || wanted.contains(line))
        .map(str::to_string)
        .collect();
    for target in targets {
        if !lines.iter().any(|line| line == target) {
            lines.push(target.to_string());
        }
    }

    // Rewrite only when the content actually changes, so repeat passes
    // leave the file byte-identical.
    let next =
        if lines.is_empty() { String::new() } else { format!("{}\n", lines.join("\n")) };
    if next != existing {
        jv_store::atomic::write_text_atomic(&exclude_path, &next)?;
    }
    Ok(())
}

/// Heuristic: a line we added earlier. Comments and glob patterns from
/// other tools are left untouched.
fn looks_managed(line: &str) -> bool {
    !line.is_empty() && !line.starts_with('#') && !line.contains('*')
}

/// Remove links for targets that fell out of the managed set, then prune
/// newly-empty parent directories up to the worktree root.
fn remove_stale(inputs: &ReconcileInputs<'_>) {
    let current: HashSet<&str> = inputs.files.iter().map(|f| f.target_path.as_str()).collect();
    for target in inputs.previous_managed_targets {
        if current.contains(target.as_str()) {
            continue;
        }
        let path = inputs.worktree_dir.join(target);
        if std::fs::symlink_metadata(&path).is_ok() {
            let _ = std::fs::remove_file(&path);
        }
        prune_empty_parents(inputs.worktree_dir, &path);
    }
}

fn prune_empty_parents(worktree_dir: &Path, removed: &Path) {
    let mut dir: Option<&Path> = removed.parent();
    while let Some(parent) = dir {
        if parent == worktree_dir || !is_strictly_inside(worktree_dir, parent) {
            break;
        }
        // remove_dir fails on non-empty; that is the stop condition.
        if std::fs::remove_dir(parent).is_err() {
            break;
        }
        dir = parent.parent();
    }
}

fn is_strictly_inside(root: &Path, candidate: &Path) -> bool {
    let root: PathBuf = root.components().collect();
    let candidate: PathBuf = candidate.components().collect();
    candidate.starts_with(&root)
        && candidate.components().count() > root.components().count()
        && !candidate.components().any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
