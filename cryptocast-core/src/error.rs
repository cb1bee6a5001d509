//! Error taxonomy shared by every pipeline stage.
//!
//! Feature and model layers raise these as typed failures. Degraded optional
//! context is not an error; see [`crate::advisor::ContextGap`].

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required upstream table is absent, empty, or lacks required columns.
    #[error("missing input '{table}': {reason}")]
    MissingInput { table: String, reason: String },

    /// Fewer rows than a lookback or horizon requires.
    #[error("insufficient history for {operation}: need {required} rows, have {available}")]
    InsufficientHistory {
        operation: String,
        required: usize,
        available: usize,
    },

    /// Inference attempted before any trained artifact exists.
    #[error("model not trained: no artifact at {}", path.display())]
    ModelNotTrained { path: PathBuf },

    /// Model and scaler artifacts do not belong together, or no longer match the feature table.
    #[error("artifact mismatch: expected {expected}, found {found}")]
    ArtifactMismatch { expected: String, found: String },

    #[error("invalid table: {0}")]
    InvalidTable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] polars::prelude::PolarsError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn missing_input(table: &str, reason: impl Into<String>) -> Self {
        Self::MissingInput {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub fn insufficient(operation: &str, required: usize, available: usize) -> Self {
        Self::InsufficientHistory {
            operation: operation.to_string(),
            required,
            available,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
