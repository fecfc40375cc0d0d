// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot import of legacy JSON files into the store.
//!
//! A marker row per `(key, kind)` guarantees the import happens at most
//! once; after that the store is authoritative and the files on disk are
//! write-only mirrors.

use crate::db::Store;
use crate::error::StoreError;
use jv_core::{IssueRef, IssueState, TaskList};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Issue,
    Tasks,
    Active,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Issue => "issue",
            Kind::Tasks => "tasks",
            Kind::Active => "active",
        }
    }
}

/// Record that a key has been imported (or first written natively).
pub(crate) fn mark(conn: &Connection, key: &str, kind: Kind) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO bootstrap_markers (state_dir, kind, imported_at_ms)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(state_dir, kind) DO NOTHING",
        params![key, kind.as_str(), Store::now_ms()],
    )?;
    Ok(())
}

fn marked(store: &Store, key: &str, kind: Kind) -> Result<bool, StoreError> {
    let conn = store.conn.lock();
    let row: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM bootstrap_markers WHERE state_dir = ?1 AND kind = ?2",
            params![key, kind.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row.is_some())
}

/// Legacy `issue.json` for a never-imported state dir, if one exists.
///
/// The issue ref is recovered from the file when present, else from the
/// state dir path shape (`…/issues/<owner>/<repo>/<n>` or
/// `…/worktrees/<owner>/<repo>/issue-<n>/.jeeves`).
pub(crate) fn legacy_issue(
    store: &Store,
    state_dir: &Path,
    key: &str,
) -> Result<Option<(IssueRef, IssueState)>, StoreError> {
    if marked(store, key, Kind::Issue)? {
        return Ok(None);
    }
    let path = state_dir.join("issue.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };

    let value: serde_json::Value = serde_json::from_str(&text)?;
    let state: IssueState = serde_json::from_value(value.clone())?;
    let issue = value
        .get("issue_ref")
        .and_then(|v| v.as_str())
        .and_then(|raw| IssueRef::parse(raw).ok())
        .or_else(|| issue_ref_from_path(state_dir));
    let Some(issue) = issue else {
        tracing::warn!(path = %path.display(), "legacy issue.json has no recoverable issue ref");
        return Ok(None);
    };
    tracing::info!(path = %path.display(), issue = %issue, "bootstrapping legacy issue.json");
    Ok(Some((issue, state)))
}

/// Legacy `tasks.json` for a never-imported state dir, if one exists.
pub(crate) fn legacy_tasks(
    store: &Store,
    state_dir: &Path,
    key: &str,
) -> Result<Option<TaskList>, StoreError> {
    if marked(store, key, Kind::Tasks)? {
        return Ok(None);
    }
    let path = state_dir.join("tasks.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    tracing::info!(path = %path.display(), "bootstrapping legacy tasks.json");
    Ok(Some(serde_json::from_str(&text)?))
}

/// Legacy `active-issue.json` under the data root, if never imported.
pub(crate) fn legacy_active(store: &Store, key: &str) -> Result<Option<IssueRef>, StoreError> {
    if marked(store, key, Kind::Active)? {
        return Ok(None);
    }
    let path = store.data_dir.join("active-issue.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let issue = value
        .get("issue_ref")
        .and_then(|v| v.as_str())
        .and_then(|raw| IssueRef::parse(raw).ok());
    if issue.is_some() {
        tracing::info!(path = %path.display(), "bootstrapping legacy active-issue.json");
    }
    Ok(issue)
}

/// Recover `(owner, repo, number)` from a state dir path.
fn issue_ref_from_path(state_dir: &Path) -> Option<IssueRef> {
    let mut parts: Vec<&str> = state_dir.iter().filter_map(|c| c.to_str()).collect();

    // Canonical: …/worktrees/<owner>/<repo>/issue-<n>/.jeeves
    if parts.last() == Some(&crate::paths::STATE_DIR_NAME) {
        parts.pop();
        let issue_part = parts.pop()?;
        let number = issue_part.strip_prefix("issue-")?.parse().ok()?;
        let repo = parts.pop()?;
        let owner = parts.pop()?;
        return Some(IssueRef::new(owner, repo, number));
    }

    // Legacy: …/issues/<owner>/<repo>/<n>
    let number = parts.pop()?.parse().ok()?;
    let repo = parts.pop()?;
    let owner = parts.pop()?;
    Some(IssueRef::new(owner, repo, number))
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
