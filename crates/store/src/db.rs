// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store handle: a single-writer sqlite connection plus the data root it
//! is co-located with.

use crate::error::StoreError;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version, written to `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// The persistence store. Writers serialize on the connection mutex;
/// readers share the same connection (operations are short).
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) data_dir: PathBuf,
}

impl Store {
    /// Open (creating if needed) the store under `data_dir`.
    ///
    /// Corruption detected on open is fatal: the caller gets a `schema`
    /// error and must not continue against this file.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("jeeves.db"))?;
        conn.busy_timeout(std::time::Duration::from_secs(10))?;

        // PRAGMA journal_mode returns a row; query_row to consume it.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL")?;

        let check: String = conn.query_row("PRAGMA quick_check(1)", [], |row| row.get(0))?;
        if !check.trim().eq_ignore_ascii_case("ok") {
            return Err(StoreError::Schema(format!("store corrupt on open: {check}")));
        }

        let store = Self { conn: Mutex::new(conn), data_dir: data_dir.to_path_buf() };
        store.migrate()?;
        Ok(store)
    }

    /// Apply forward migrations idempotently.
    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < 1 {
            conn.execute_batch(SCHEMA_V1)?;
        }
        if version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
            tracing::info!(from = version, to = SCHEMA_VERSION, "store schema migrated");
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub(crate) fn now_ms() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    repo TEXT NOT NULL,
    UNIQUE(owner, repo)
);
CREATE TABLE IF NOT EXISTS repository_issues (
    id INTEGER PRIMARY KEY,
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    issue_number INTEGER NOT NULL,
    issue_title TEXT NOT NULL DEFAULT '',
    branch TEXT NOT NULL DEFAULT '',
    phase TEXT NOT NULL DEFAULT '',
    workflow TEXT NOT NULL DEFAULT '',
    UNIQUE(repository_id, issue_number)
);
CREATE TABLE IF NOT EXISTS issue_state_core (
    state_dir TEXT PRIMARY KEY,
    issue_id INTEGER NOT NULL REFERENCES repository_issues(id),
    status_json TEXT NOT NULL DEFAULT '{}',
    updated_at_ms INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS issue_task_lists (
    state_dir TEXT PRIMARY KEY,
    tasks_split INTEGER NOT NULL DEFAULT 0,
    task_count INTEGER NOT NULL DEFAULT 0,
    extra_json TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS issue_task_items (
    state_dir TEXT NOT NULL,
    task_index INTEGER NOT NULL,
    task_id TEXT NOT NULL,
    title TEXT,
    summary TEXT,
    files_allowed_json TEXT,
    acceptance_json TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    PRIMARY KEY (state_dir, task_index)
);
CREATE TABLE IF NOT EXISTS issue_task_dependencies (
    state_dir TEXT NOT NULL,
    task_index INTEGER NOT NULL,
    dep_index INTEGER NOT NULL,
    depends_on_task_id TEXT NOT NULL,
    PRIMARY KEY (state_dir, task_index, dep_index)
);
CREATE TABLE IF NOT EXISTS issue_memory (
    state_dir TEXT NOT NULL,
    scope TEXT NOT NULL,
    key TEXT NOT NULL,
    value_json TEXT NOT NULL,
    source_iteration INTEGER NOT NULL DEFAULT 0,
    stale INTEGER NOT NULL DEFAULT 0,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    PRIMARY KEY (state_dir, scope, key)
);
CREATE TABLE IF NOT EXISTS content_prompts (
    id TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    sha TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS content_workflows (
    name TEXT PRIMARY KEY,
    yaml TEXT NOT NULL,
    parsed_json TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS active_issue (
    data_dir TEXT PRIMARY KEY,
    issue_ref TEXT NOT NULL,
    saved_at_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS bootstrap_markers (
    state_dir TEXT NOT NULL,
    kind TEXT NOT NULL,
    imported_at_ms INTEGER NOT NULL,
    PRIMARY KEY (state_dir, kind)
);
";

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
