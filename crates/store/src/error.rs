// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store failure surface: every error maps to one of three kinds.

use thiserror::Error;

/// A persistence failure. The kind label (`io`, `schema`, `conflict`) is
/// the contract callers dispatch on; messages are for humans.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(String),

    #[error("store schema: {0}")]
    Schema(String),

    #[error("store conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "io",
            StoreError::Schema(_) => "schema",
            StoreError::Conflict(_) => "conflict",
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(e.to_string())
            }
            rusqlite::Error::SqliteFailure(..) => StoreError::Io(e.to_string()),
            _ => StoreError::Schema(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Schema(e.to_string())
    }
}
