//! Error types for verification runs.
//!
//! `VerifyError` aborts a run. `JudgeError` belongs to a single record and is
//! reported as unscored without stopping the run.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Dataset format error at row {row}: {message}")]
    DatasetFormat { row: usize, message: String },

    #[error("Failed to read dataset {path}")]
    DatasetIo {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Insufficient data: need at least {needed} records, found {found}")]
    InsufficientData { needed: usize, found: usize },

    #[error("No scorable predictions: every judge call failed or nothing was selected")]
    EmptyReport,

    #[error("Ledger error: {context}")]
    Ledger {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl VerifyError {
    pub fn ledger(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Ledger {
            context: context.into(),
            source,
        }
    }
}

/// Failure of one judge invocation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JudgeError {
    #[error("Judge API error: {0}")]
    Api(String),

    #[error("Judge response violated the verdict schema: {0}")]
    SchemaViolation(String),

    #[error("Judge call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to build judge request: {0}")]
    Request(String),

    #[error("Judge call aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, VerifyError>;
