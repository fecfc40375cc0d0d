// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-issue memory rows, unique on `(state_dir, scope, key)`.

use crate::db::Store;
use crate::error::StoreError;
use jv_core::{MemoryEntry, MemoryScope};
use rusqlite::params;
use std::path::Path;

impl Store {
    /// Insert or update one memory entry. `created_at_ms` is preserved on
    /// update; `updated_at_ms` is stamped.
    pub fn upsert_memory(
        &self,
        state_dir: &Path,
        scope: MemoryScope,
        key: &str,
        value: &serde_json::Value,
        source_iteration: u32,
    ) -> Result<(), StoreError> {
        let state_dir_key = state_dir.to_string_lossy().into_owned();
        let now = Self::now_ms();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO issue_memory
                 (state_dir, scope, key, value_json, source_iteration, stale,
                  created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
             ON CONFLICT(state_dir, scope, key) DO UPDATE SET
                 value_json = excluded.value_json,
                 source_iteration = excluded.source_iteration,
                 stale = 0,
                 updated_at_ms = excluded.updated_at_ms",
            params![
                state_dir_key,
                scope.label(),
                key,
                serde_json::to_string(value)?,
                source_iteration,
                now
            ],
        )?;
        Ok(())
    }

    /// List entries for a state dir, optionally filtered to one scope.
    /// Stale entries are included; callers filter if they care.
    pub fn list_memory(
        &self,
        state_dir: &Path,
        scope: Option<MemoryScope>,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        let state_dir_key = state_dir.to_string_lossy().into_owned();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT scope, key, value_json, source_iteration, stale,
                    created_at_ms, updated_at_ms
             FROM issue_memory
             WHERE state_dir = ?1 AND (?2 IS NULL OR scope = ?2)
             ORDER BY scope, key",
        )?;
        let rows = stmt.query_map(params![state_dir_key, scope.map(|s| s.label())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, u64>(6)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (scope_str, key, value_json, source_iteration, stale, created, updated) = row?;
            let scope = MemoryScope::parse(&scope_str)
                .ok_or_else(|| StoreError::Schema(format!("unknown memory scope: {scope_str}")))?;
            entries.push(MemoryEntry {
                scope,
                key,
                value: serde_json::from_str(&value_json)?,
                source_iteration,
                stale,
                created_at_ms: created,
                updated_at_ms: updated,
            });
        }
        Ok(entries)
    }

    /// Soft-delete an entry. Missing rows are fine (idempotent).
    pub fn mark_memory_stale(
        &self,
        state_dir: &Path,
        scope: MemoryScope,
        key: &str,
    ) -> Result<(), StoreError> {
        let state_dir_key = state_dir.to_string_lossy().into_owned();
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE issue_memory SET stale = 1, updated_at_ms = ?4
             WHERE state_dir = ?1 AND scope = ?2 AND key = ?3",
            params![state_dir_key, scope.label(), key, Self::now_ms()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
