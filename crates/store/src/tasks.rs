// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task list rows. Dependencies keep source order and multiplicity so the
//! tasks file round-trips exactly; schedulers treat them as sets.

use crate::bootstrap;
use crate::db::Store;
use crate::error::StoreError;
use jv_core::{Task, TaskList, TaskStatus};
use rusqlite::{params, OptionalExtension};
use std::path::Path;

impl Store {
    /// Replace the items and dependencies for a state dir in one
    /// transaction and recompute `task_count`. Mirrors `tasks.json` back
    /// to the state dir.
    pub fn write_tasks(&self, state_dir: &Path, tasks: &TaskList) -> Result<(), StoreError> {
        let state_dir_key = state_dir.to_string_lossy().into_owned();
        {
            let conn = self.conn.lock();
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = (|| -> Result<(), StoreError> {
                conn.execute(
                    "DELETE FROM issue_task_items WHERE state_dir = ?1",
                    params![state_dir_key],
                )?;
                conn.execute(
                    "DELETE FROM issue_task_dependencies WHERE state_dir = ?1",
                    params![state_dir_key],
                )?;

                for (index, task) in tasks.tasks.iter().enumerate() {
                    conn.execute(
                        "INSERT INTO issue_task_items
                             (state_dir, task_index, task_id, title, summary,
                              files_allowed_json, acceptance_json, status)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            state_dir_key,
                            index,
                            task.id,
                            task.title,
                            task.summary,
                            to_json_opt(&task.files_allowed)?,
                            to_json_opt(&task.acceptance_criteria)?,
                            task.status.to_string(),
                        ],
                    )?;
                    for (dep_index, dep) in task.depends_on.iter().enumerate() {
                        conn.execute(
                            "INSERT INTO issue_task_dependencies
                                 (state_dir, task_index, dep_index, depends_on_task_id)
                             VALUES (?1, ?2, ?3, ?4)",
                            params![state_dir_key, index, dep_index, dep],
                        )?;
                    }
                }

                conn.execute(
                    "INSERT INTO issue_task_lists (state_dir, tasks_split, task_count, extra_json)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(state_dir) DO UPDATE SET
                         tasks_split = excluded.tasks_split,
                         task_count = excluded.task_count,
                         extra_json = excluded.extra_json",
                    params![
                        state_dir_key,
                        tasks.tasks_split,
                        tasks.tasks.len(),
                        serde_json::to_string(&serde_json::Value::Object(tasks.extra.clone()))?,
                    ],
                )?;
                bootstrap::mark(&conn, &state_dir_key, bootstrap::Kind::Tasks)?;
                Ok(())
            })();
            match result {
                Ok(()) => conn.execute_batch("COMMIT")?,
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e);
                }
            }
        }

        crate::atomic::write_json_atomic(&state_dir.join("tasks.json"), tasks)?;
        Ok(())
    }

    /// Read the tasks file for a state dir, bootstrapping a legacy
    /// `tasks.json` on first miss.
    pub fn read_tasks(&self, state_dir: &Path) -> Result<Option<TaskList>, StoreError> {
        let state_dir_key = state_dir.to_string_lossy().into_owned();

        if let Some(list) = self.read_tasks_rows(&state_dir_key)? {
            return Ok(Some(list));
        }

        if let Some(list) = bootstrap::legacy_tasks(self, state_dir, &state_dir_key)? {
            self.write_tasks(state_dir, &list)?;
            return Ok(self.read_tasks_rows(&state_dir_key)?);
        }

        Ok(None)
    }

    fn read_tasks_rows(&self, state_dir_key: &str) -> Result<Option<TaskList>, StoreError> {
        let conn = self.conn.lock();
        let header = conn
            .query_row(
                "SELECT tasks_split, extra_json FROM issue_task_lists WHERE state_dir = ?1",
                params![state_dir_key],
                |row| Ok((row.get::<_, bool>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((tasks_split, extra_json)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT task_index, task_id, title, summary, files_allowed_json,
                    acceptance_json, status
             FROM issue_task_items WHERE state_dir = ?1 ORDER BY task_index",
        )?;
        let rows = stmt.query_map(params![state_dir_key], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            let (index, id, title, summary, files_allowed, acceptance, status) = row?;
            let depends_on = {
                let mut dep_stmt = conn.prepare(
                    "SELECT depends_on_task_id FROM issue_task_dependencies
                     WHERE state_dir = ?1 AND task_index = ?2 ORDER BY dep_index",
                )?;
                let deps = dep_stmt
                    .query_map(params![state_dir_key, index], |row| row.get::<_, String>(0))?;
                let mut out = Vec::new();
                for dep in deps {
                    out.push(dep?);
                }
                out
            };
            tasks.push(Task {
                id,
                title,
                summary,
                files_allowed: from_json_opt(&files_allowed)?,
                acceptance_criteria: from_json_opt(&acceptance)?,
                depends_on,
                status: parse_status(&status)?,
            });
        }

        let extra = match serde_json::from_str(&extra_json)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok(Some(TaskList { tasks_split, tasks, extra }))
    }
}

fn to_json_opt(value: &Option<Vec<String>>) -> Result<Option<String>, StoreError> {
    value.as_ref().map(|v| serde_json::to_string(v).map_err(StoreError::from)).transpose()
}

fn from_json_opt(value: &Option<String>) -> Result<Option<Vec<String>>, StoreError> {
    value.as_ref().map(|v| serde_json::from_str(v).map_err(StoreError::from)).transpose()
}

fn parse_status(status: &str) -> Result<TaskStatus, StoreError> {
    serde_json::from_value(serde_json::Value::String(status.to_string()))
        .map_err(|_| StoreError::Schema(format!("unknown task status: {status}")))
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
