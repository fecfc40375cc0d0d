// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The one active issue per data root.

use crate::bootstrap;
use crate::db::Store;
use crate::error::StoreError;
use jv_core::IssueRef;
use rusqlite::{params, OptionalExtension};

impl Store {
    pub fn set_active_issue(&self, issue: &IssueRef) -> Result<(), StoreError> {
        let data_dir_key = self.data_dir.to_string_lossy().into_owned();
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO active_issue (data_dir, issue_ref, saved_at_ms)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(data_dir) DO UPDATE SET
                     issue_ref = excluded.issue_ref,
                     saved_at_ms = excluded.saved_at_ms",
                params![data_dir_key, issue.to_string(), Self::now_ms()],
            )?;
            bootstrap::mark(&conn, &data_dir_key, bootstrap::Kind::Active)?;
        }
        crate::atomic::write_json_atomic(
            &self.data_dir.join("active-issue.json"),
            &serde_json::json!({ "issue_ref": issue.to_string() }),
        )?;
        Ok(())
    }

    pub fn active_issue(&self) -> Result<Option<IssueRef>, StoreError> {
        let data_dir_key = self.data_dir.to_string_lossy().into_owned();

        let row: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT issue_ref FROM active_issue WHERE data_dir = ?1",
                params![data_dir_key],
                |row| row.get(0),
            )
            .optional()?
        };

        if let Some(raw) = row {
            return Ok(Some(IssueRef::parse(&raw).map_err(|e| {
                StoreError::Schema(format!("stored active issue unparseable: {e}"))
            })?));
        }

        if let Some(issue) = bootstrap::legacy_active(self, &data_dir_key)? {
            self.set_active_issue(&issue)?;
            return Ok(Some(issue));
        }

        Ok(None)
    }
}

#[cfg(test)]
#[path = "active_tests.rs"]
mod tests;
