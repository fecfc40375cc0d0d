// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The managed project-file registry: an `index.json` plus a blob dir
//! per repository, capped in size, written through the atomic layer.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Cap on managed files per repository.
pub const FILE_CAP: usize = 64;

/// One projected file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedFile {
    pub id: u64,
    pub display_name: String,
    /// Worktree-relative destination; unique per repo.
    pub target_path: String,
    /// Blob location relative to the repo-files dir.
    pub storage_relpath: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub updated_at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Index {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    files: Vec<ManagedFile>,
}

/// Registry for one repository's managed files.
pub struct ProjectFiles {
    repo_files_dir: PathBuf,
}

impl ProjectFiles {
    pub fn new(repo_files_dir: impl Into<PathBuf>) -> Self {
        Self { repo_files_dir: repo_files_dir.into() }
    }

    pub fn repo_files_dir(&self) -> &Path {
        &self.repo_files_dir
    }

    fn index_path(&self) -> PathBuf {
        self.repo_files_dir.join("index.json")
    }

    fn load(&self) -> Result<Index, EngineError> {
        match std::fs::read_to_string(self.index_path()) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| EngineError::Internal(format!("project file index corrupt: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Index::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, index: &Index) -> Result<(), EngineError> {
        jv_store::atomic::write_json_atomic(&self.index_path(), index)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ManagedFile>, EngineError> {
        Ok(self.load()?.files)
    }

    /// Create or replace a managed file.
    ///
    /// Creating a new record whose `target_path` is already registered is
    /// a `TARGET_PATH_EXISTS` conflict; pass `replace = true` to update
    /// the existing record's content in place.
    pub fn upsert(
        &self,
        display_name: &str,
        target_path: &str,
        content: &[u8],
        replace: bool,
    ) -> Result<ManagedFile, EngineError> {
        if target_path.trim().is_empty() {
            return Err(EngineError::field("target_path", "must not be empty"));
        }
        if Path::new(target_path).is_absolute() || target_path.contains("..") {
            return Err(EngineError::field("target_path", "must be a safe relative path"));
        }

        let mut index = self.load()?;
        let now = now_ms();
        let sha256 = sha256_hex(content);

        if let Some(existing) =
            index.files.iter_mut().find(|file| file.target_path == target_path)
        {
            if !replace {
                return Err(EngineError::conflict(
                    "TARGET_PATH_EXISTS",
                    format!("{target_path} is already managed"),
                ));
            }
            let blob = self.repo_files_dir.join(&existing.storage_relpath);
            write_blob(&blob, content)?;
            existing.display_name = display_name.to_string();
            existing.size_bytes = content.len() as u64;
            existing.sha256 = sha256;
            existing.updated_at_ms = now;
            let updated = existing.clone();
            self.save(&index)?;
            return Ok(updated);
        }

        if index.files.len() >= FILE_CAP {
            return Err(EngineError::conflict(
                "FILE_CAP_EXCEEDED",
                format!("repository already has {FILE_CAP} managed files"),
            ));
        }

        index.next_id += 1;
        let id = index.next_id;
        let storage_relpath = format!("blobs/{id}");
        write_blob(&self.repo_files_dir.join(&storage_relpath), content)?;

        let record = ManagedFile {
            id,
            display_name: display_name.to_string(),
            target_path: target_path.to_string(),
            storage_relpath,
            size_bytes: content.len() as u64,
            sha256,
            updated_at_ms: now,
        };
        index.files.push(record.clone());
        self.save(&index)?;
        Ok(record)
    }

    /// Remove a record and its blob. Unknown ids are `not_found`.
    pub fn delete(&self, id: u64) -> Result<ManagedFile, EngineError> {
        let mut index = self.load()?;
        let position = index
            .files
            .iter()
            .position(|file| file.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("managed file {id}")))?;
        let removed = index.files.remove(position);
        let _ = std::fs::remove_file(self.repo_files_dir.join(&removed.storage_relpath));
        self.save(&index)?;
        Ok(removed)
    }

    /// Read a managed file's blob.
    pub fn read_blob(&self, file: &ManagedFile) -> Result<Vec<u8>, EngineError> {
        Ok(std::fs::read(self.repo_files_dir.join(&file.storage_relpath))?)
    }
}

fn write_blob(path: &Path, content: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Blob names are ids; a straight write is fine because the index is
    // what readers trust, and it is written atomically after the blob.
    std::fs::write(path, content)?;
    Ok(())
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
