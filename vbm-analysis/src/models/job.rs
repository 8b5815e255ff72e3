//! Analysis job state machine
//!
//! PENDING → PROCESSING → COMPLETE | FAILED | CANCELLED, plus FAILED → PENDING
//! on retry. Any other change is an [`InvalidTransition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use super::results::AnalysisResults;

/// Analysis job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Created, waiting for a worker
    Pending,
    /// Extraction running on a worker
    Processing,
    /// Results stored
    Complete,
    /// Extraction produced nothing or the worker crashed; retryable
    Failed,
    /// Stopped by shutdown or the operator
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Edges of the state machine
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Complete)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Failed, Pending)
        )
    }

    /// Terminal for external purposes; FAILED can still be retried
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETE" => Ok(JobStatus::Complete),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from} → {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Status change record
///
/// The only way to build one is [`StateTransition::new`], which checks the
/// edge against the state machine. Every store transition returns one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_status: JobStatus,
    pub new_status: JobStatus,
    pub transitioned_at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(job_id: Uuid, from: JobStatus, to: JobStatus) -> Result<Self, InvalidTransition> {
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }
        Ok(Self {
            job_id,
            old_status: from,
            new_status: to,
            transitioned_at: Utc::now(),
        })
    }
}

/// One analysis of one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stored recording; kept until the job is deleted so retry works
    pub recording_path: PathBuf,
    pub error_message: Option<String>,
    /// None until the job completes, and again after a retry reset
    pub results: Option<AnalysisResults>,
}

impl AnalysisJob {
    pub fn new(recording_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            recording_path,
            error_message: None,
            results: None,
        }
    }
}
