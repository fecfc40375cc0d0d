// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable prompt and workflow content, mirrored to readable files.
//!
//! The store rows are authoritative after bootstrap; the filesystem
//! mirror under `prompts/` and `workflows/` exists so operators can read
//! and diff what the system is running.

use crate::db::Store;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

/// A stored prompt body plus its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContent {
    pub id: String,
    pub body: String,
    pub sha: String,
    pub updated_at_ms: u64,
}

/// A stored workflow document, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowContent {
    pub name: String,
    pub yaml: String,
    pub parsed_json: String,
    pub updated_at_ms: u64,
}

pub(crate) fn sha256_hex(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Store {
    pub fn put_prompt(&self, id: &str, body: &str) -> Result<(), StoreError> {
        let sha = sha256_hex(body);
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO content_prompts (id, body, sha, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     body = excluded.body,
                     sha = excluded.sha,
                     updated_at_ms = excluded.updated_at_ms",
                params![id, body, sha, Self::now_ms()],
            )?;
        }
        let mirror = self.data_dir.join("prompts").join(format!("{id}.md"));
        crate::atomic::write_text_atomic(&mirror, body)?;
        Ok(())
    }

    pub fn get_prompt(&self, id: &str) -> Result<Option<PromptContent>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, body, sha, updated_at_ms FROM content_prompts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(PromptContent {
                        id: row.get(0)?,
                        body: row.get(1)?,
                        sha: row.get(2)?,
                        updated_at_ms: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Store a workflow document. `parsed_json` is the loader's normalized
    /// form, kept alongside the source yaml for cheap reads.
    pub fn put_workflow(&self, name: &str, yaml: &str, parsed_json: &str) -> Result<(), StoreError> {
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO content_workflows (name, yaml, parsed_json, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     yaml = excluded.yaml,
                     parsed_json = excluded.parsed_json,
                     updated_at_ms = excluded.updated_at_ms",
                params![name, yaml, parsed_json, Self::now_ms()],
            )?;
        }
        let mirror = self.data_dir.join("workflows").join(format!("{name}.yaml"));
        crate::atomic::write_text_atomic(&mirror, yaml)?;
        Ok(())
    }

    pub fn get_workflow(&self, name: &str) -> Result<Option<WorkflowContent>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT name, yaml, parsed_json, updated_at_ms
                 FROM content_workflows WHERE name = ?1",
                params![name],
                |row| {
                    Ok(WorkflowContent {
                        name: row.get(0)?,
                        yaml: row.get(1)?,
                        parsed_json: row.get(2)?,
                        updated_at_ms: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn list_workflow_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM content_workflows ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// True when no workflow rows exist yet — the signal to bootstrap from
    /// the filesystem mirror.
    pub fn workflows_empty(&self) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM content_workflows", [], |row| {
            row.get(0)
        })?;
        Ok(count == 0)
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod tests;
