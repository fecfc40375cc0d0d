// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy, mirrored onto wire codes by the server.
//!
//! Raw subprocess output never rides inside these errors; only safe,
//! pre-classified messages reach callers.

use jv_core::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {message}")]
    Validation {
        message: String,
        /// Per-field problems for request-shaped failures.
        field_errors: Vec<(String, String)>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{code}: {message}")]
    Conflict { code: &'static str, message: String },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("io: {0}")]
    Io(String),

    #[error("provider: {0}")]
    Provider(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation { message: message.into(), field_errors: Vec::new() }
    }

    pub fn field(field: &str, problem: &str) -> Self {
        EngineError::Validation {
            message: format!("invalid {field}"),
            field_errors: vec![(field.to_string(), problem.to_string())],
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        EngineError::Conflict { code, message: message.into() }
    }

    /// Error kind label per the taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Scheduler(_) => "scheduler",
            EngineError::Io(_) => "io",
            EngineError::Provider(_) => "provider",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Stable machine-readable code for the wire envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Conflict { code, .. } => code,
            EngineError::Scheduler(e) => e.code(),
            EngineError::Validation { .. } => "VALIDATION",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Io(_) => "IO",
            EngineError::Provider(_) => "PROVIDER",
            EngineError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<jv_store::StoreError> for EngineError {
    fn from(e: jv_store::StoreError) -> Self {
        match e.kind() {
            "conflict" => EngineError::conflict("STORE_CONFLICT", e.to_string()),
            "schema" => EngineError::Internal(e.to_string()),
            _ => EngineError::Io(e.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<jv_workflow::WorkflowError> for EngineError {
    fn from(e: jv_workflow::WorkflowError) -> Self {
        EngineError::Validation { message: e.to_string(), field_errors: Vec::new() }
    }
}

impl From<jv_workflow::EngineError> for EngineError {
    fn from(e: jv_workflow::EngineError) -> Self {
        EngineError::Internal(e.to_string())
    }
}

impl From<jv_provider::ProviderError> for EngineError {
    fn from(e: jv_provider::ProviderError) -> Self {
        EngineError::Provider(e.to_string())
    }
}
