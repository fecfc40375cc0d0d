// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-platform data root and the directory layout beneath it.

use jv_core::IssueRef;
use std::path::{Path, PathBuf};

/// Environment override for the data root.
pub const DATA_DIR_ENV: &str = "JEEVES_DATA_DIR";

/// Environment override for where worktrees are created.
pub const WORKTREE_ROOT_ENV: &str = "JEEVES_WORKTREE_ROOT";

/// Name of the per-issue state directory inside a worktree.
pub const STATE_DIR_NAME: &str = ".jeeves";

/// The data layout rooted at one directory. Everything takes an explicit
/// root so tests can point at a tempdir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    worktree_root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let worktree_root = root.join("worktrees");
        Self { root, worktree_root }
    }

    pub fn with_worktree_root(mut self, worktree_root: impl Into<PathBuf>) -> Self {
        self.worktree_root = worktree_root.into();
        self
    }

    /// Resolve the layout from the environment: `$JEEVES_DATA_DIR` wins,
    /// then the platform data dir (`%LOCALAPPDATA%`, `~/Library/Application
    /// Support`, `$XDG_DATA_HOME` or `~/.local/share`).
    pub fn resolve() -> Self {
        let root = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::data_local_dir().map(|d| d.join("jeeves")))
            .unwrap_or_else(|| PathBuf::from(".jeeves-data"));
        let mut layout = Layout::new(root);
        if let Some(worktrees) = std::env::var_os(WORKTREE_ROOT_ENV) {
            layout = layout.with_worktree_root(PathBuf::from(worktrees));
        }
        layout
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("jeeves.db")
    }

    pub fn active_issue_path(&self) -> PathBuf {
        self.root.join("active-issue.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("jeeves.lock")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    pub fn worktree_dir(&self, issue: &IssueRef) -> PathBuf {
        self.worktree_root
            .join(&issue.owner)
            .join(&issue.repo)
            .join(format!("issue-{}", issue.number))
    }

    /// Canonical issue state dir, inside the worktree.
    pub fn state_dir(&self, issue: &IssueRef) -> PathBuf {
        self.worktree_dir(issue).join(STATE_DIR_NAME)
    }

    /// Legacy state dir under the data root, supported on read.
    pub fn legacy_state_dir(&self, issue: &IssueRef) -> PathBuf {
        self.root
            .join("issues")
            .join(&issue.owner)
            .join(&issue.repo)
            .join(issue.number.to_string())
    }

    pub fn repo_files_dir(&self, owner: &str, repo: &str) -> PathBuf {
        self.root.join("repo-files").join(owner).join(repo)
    }

    pub fn repo_files_index(&self, owner: &str, repo: &str) -> PathBuf {
        self.repo_files_dir(owner, repo).join("index.json")
    }

    pub fn repo_files_blobs(&self, owner: &str, repo: &str) -> PathBuf {
        self.repo_files_dir(owner, repo).join("blobs")
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
