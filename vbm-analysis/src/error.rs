//! Error types for vbm-analysis
//!
//! Controller and job store errors. Extraction components never surface
//! errors past their own boundary; see `types::ProviderFailure`,
//! `audio::IngestError` and `linguistic::models::ModelError`.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{InvalidTransition, JobStatus};

/// Result type for controller and store operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Controller / job store error
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No job with this id
    #[error("Analysis job not found: {0}")]
    NotFound(Uuid),

    /// Requested status change is not an edge of the state machine
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Status changed underneath us between read and write
    #[error("Job {id} is no longer {expected}")]
    Conflict { id: Uuid, expected: JobStatus },

    /// Operation not allowed while the job is on a worker
    #[error("Job {0} is processing")]
    Busy(Uuid),

    /// The recording a job refers to has been removed
    #[error("Recording no longer exists: {0}")]
    RecordingMissing(PathBuf),

    /// Recording rejected at submission time
    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    /// Controller is shutting down and accepts no new work
    #[error("Analysis controller is shutting down")]
    ShuttingDown,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization of stored results
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// vbm-common error
    #[error("Common error: {0}")]
    Common(#[from] vbm_common::Error),
}
