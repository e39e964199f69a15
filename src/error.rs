//! Error types for convoforge operations.
//!
//! Defines the error taxonomy for the pipeline core:
//! - Schema/contract violations (fatal, surfaced to the caller)
//! - Stage worker failures (recovered locally via fallback artifacts)
//! - Dataset export failures
//!
//! Controller- and config-level errors live next to their owners in
//! `pipeline::controller` and `pipeline::config`.

use std::time::Duration;
use thiserror::Error;

use crate::stages::Stage;

/// A contract violation: a stage input or output does not satisfy the
/// required shape.
///
/// Schema errors on stage *inputs* are caller errors and terminate the run;
/// schema errors on worker *outputs* are wrapped in
/// [`WorkerError::ContractViolation`] and recovered via fallback.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("stage '{stage}': missing required field '{field}'")]
    MissingField { stage: Stage, field: &'static str },

    #[error("stage '{stage}': field '{field}' is invalid: {reason}")]
    InvalidField {
        stage: Stage,
        field: &'static str,
        reason: String,
    },

    #[error("stage '{stage}': '{field}' must contain at least one element")]
    EmptyCollection { stage: Stage, field: &'static str },

    #[error("stage '{stage}': expected {expected} payload, got {actual}")]
    PayloadMismatch {
        stage: Stage,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("stage '{stage}': broken reference: {reason}")]
    BrokenReference { stage: Stage, reason: String },
}

impl SchemaError {
    /// The stage whose contract was violated.
    pub fn stage(&self) -> Stage {
        match self {
            SchemaError::MissingField { stage, .. }
            | SchemaError::InvalidField { stage, .. }
            | SchemaError::EmptyCollection { stage, .. }
            | SchemaError::PayloadMismatch { stage, .. }
            | SchemaError::BrokenReference { stage, .. } => *stage,
        }
    }
}

/// A stage worker failure.
///
/// Worker errors never block the pipeline: the executor substitutes a
/// fallback artifact and records the failure in the stage metrics.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker failed: {0}")]
    Failed(String),

    #[error("worker output violated its contract: {0}")]
    ContractViolation(#[source] SchemaError),
}

/// Errors that can occur while exporting a finalized dataset.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no dataset items to export")]
    NoItems,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
