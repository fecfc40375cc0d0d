// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue rows: normalized repository/issue tables plus the opaque status
//! payload keyed by state dir.

use crate::bootstrap;
use crate::db::Store;
use crate::error::StoreError;
use jv_core::{IssueRef, IssueState};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// One row of `list_issues`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IssueSummary {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub branch: String,
    pub phase: String,
    pub workflow: String,
    pub state_dir: Option<String>,
    pub updated_at_ms: u64,
}

impl IssueSummary {
    pub fn issue_ref(&self) -> IssueRef {
        IssueRef::new(self.owner.clone(), self.repo.clone(), self.issue_number)
    }
}

impl Store {
    /// Atomically upsert the derived fields and the opaque payload for one
    /// issue. Returns the stamped `updated_at_ms`, which is monotonic per
    /// state dir across successful writes.
    ///
    /// The legacy `issue.json` in the state dir is mirrored back for
    /// debuggability; it is never read except at bootstrap.
    pub fn write_issue(
        &self,
        state_dir: &Path,
        issue: &IssueRef,
        state: &IssueState,
    ) -> Result<u64, StoreError> {
        let state_dir_key = state_dir.to_string_lossy().into_owned();
        let status_json = serde_json::to_string(&serde_json::Value::Object(state.status.clone()))?;

        let updated_at_ms = {
            let conn = self.conn.lock();
            let tx_updated = write_issue_tx(&conn, &state_dir_key, issue, state, &status_json)?;
            bootstrap::mark(&conn, &state_dir_key, bootstrap::Kind::Issue)?;
            tx_updated
        };

        let mut mirrored = state.clone();
        mirrored.updated_at_ms = updated_at_ms;
        crate::atomic::write_json_atomic(&state_dir.join("issue.json"), &mirrored)?;
        Ok(updated_at_ms)
    }

    /// Read the payload exactly as last written. Returns `None` for a
    /// state dir the store has never seen and that has no legacy file to
    /// bootstrap from.
    pub fn read_issue(&self, state_dir: &Path) -> Result<Option<IssueState>, StoreError> {
        let state_dir_key = state_dir.to_string_lossy().into_owned();

        if let Some(state) = self.read_issue_row(&state_dir_key)? {
            return Ok(Some(state));
        }

        // Store empty for this key: a legacy issue.json is imported once.
        if let Some((issue, state)) = bootstrap::legacy_issue(self, state_dir, &state_dir_key)? {
            self.write_issue(state_dir, &issue, &state)?;
            return Ok(self.read_issue_row(&state_dir_key)?);
        }

        Ok(None)
    }

    fn read_issue_row(&self, state_dir_key: &str) -> Result<Option<IssueState>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT ri.branch, ri.phase, ri.workflow, ri.issue_title,
                        isc.status_json, isc.updated_at_ms
                 FROM issue_state_core isc
                 JOIN repository_issues ri ON ri.id = isc.issue_id
                 WHERE isc.state_dir = ?1",
                params![state_dir_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, u64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((branch, phase, workflow, issue_title, status_json, updated_at_ms)) = row else {
            return Ok(None);
        };

        let status = match serde_json::from_str(&status_json)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Ok(Some(IssueState {
            branch,
            phase,
            workflow,
            issue_title,
            status,
            updated_at_ms,
        }))
    }

    /// Summaries ordered by `(owner, repo, issue_number)`.
    pub fn list_issues(&self) -> Result<Vec<IssueSummary>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.owner, r.repo, ri.issue_number, ri.issue_title,
                    ri.branch, ri.phase, ri.workflow,
                    isc.state_dir, COALESCE(isc.updated_at_ms, 0)
             FROM repository_issues ri
             JOIN repositories r ON r.id = ri.repository_id
             LEFT JOIN issue_state_core isc ON isc.issue_id = ri.id
             ORDER BY r.owner, r.repo, ri.issue_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IssueSummary {
                owner: row.get(0)?,
                repo: row.get(1)?,
                issue_number: row.get(2)?,
                issue_title: row.get(3)?,
                branch: row.get(4)?,
                phase: row.get(5)?,
                workflow: row.get(6)?,
                state_dir: row.get(7)?,
                updated_at_ms: row.get(8)?,
            })
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }
}

/// Upsert in one transaction; callers hold the connection lock.
fn write_issue_tx(
    conn: &Connection,
    state_dir_key: &str,
    issue: &IssueRef,
    state: &IssueState,
    status_json: &str,
) -> Result<u64, StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<u64, StoreError> {
        conn.execute(
            "INSERT INTO repositories (owner, repo) VALUES (?1, ?2)
             ON CONFLICT(owner, repo) DO NOTHING",
            params![issue.owner, issue.repo],
        )?;
        let repository_id: i64 = conn.query_row(
            "SELECT id FROM repositories WHERE owner = ?1 AND repo = ?2",
            params![issue.owner, issue.repo],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO repository_issues
                 (repository_id, issue_number, issue_title, branch, phase, workflow)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(repository_id, issue_number) DO UPDATE SET
                 issue_title = excluded.issue_title,
                 branch = excluded.branch,
                 phase = excluded.phase,
                 workflow = excluded.workflow",
            params![
                repository_id,
                issue.number,
                state.issue_title,
                state.branch,
                state.phase,
                state.workflow
            ],
        )?;
        let issue_id: i64 = conn.query_row(
            "SELECT id FROM repository_issues WHERE repository_id = ?1 AND issue_number = ?2",
            params![repository_id, issue.number],
            |row| row.get(0),
        )?;

        let previous: u64 = conn
            .query_row(
                "SELECT updated_at_ms FROM issue_state_core WHERE state_dir = ?1",
                params![state_dir_key],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        // Monotonic even when the wall clock stands still or steps back.
        let updated_at_ms = Store::now_ms().max(previous + 1);

        conn.execute(
            "INSERT INTO issue_state_core (state_dir, issue_id, status_json, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(state_dir) DO UPDATE SET
                 issue_id = excluded.issue_id,
                 status_json = excluded.status_json,
                 updated_at_ms = excluded.updated_at_ms",
            params![state_dir_key, issue_id, status_json, updated_at_ms],
        )?;
        Ok(updated_at_ms)
    })();

    match result {
        Ok(updated) => {
            conn.execute_batch("COMMIT")?;
            Ok(updated)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "issues_tests.rs"]
mod tests;
