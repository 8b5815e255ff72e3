//! Analysis job persistence
//!
//! Status changes only happen through the named transitions below. Each one
//! is a compare-and-set on the current status, so a transition whose
//! precondition no longer holds is reported as a conflict instead of
//! overwriting someone else's write.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;
use vbm_common::time;

use crate::error::{AnalysisError, Result};
use crate::models::{AnalysisJob, AnalysisResults, InvalidTransition, JobStatus, StateTransition};

/// Error message stored on jobs whose owning process stopped heartbeating
pub const ABANDONED_MESSAGE: &str = "Worker lost: the process running this job stopped responding";

/// Column changes that accompany a status change
enum FieldUpdate {
    Claim { owner: Uuid },
    Error(String),
    Results { results: String, provenance: String },
    Clear,
}

#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert(&self, job: &AnalysisJob) -> Result<()> {
        let (results, provenance) = match &job.results {
            Some(results) => (
                Some(serde_json::to_string(results)?),
                Some(serde_json::to_string(&results.provenance())?),
            ),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO analysis_jobs (
                id, status, recording_path, created_at, updated_at,
                error_message, results, provenance
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.status.as_str())
        .bind(job.recording_path.to_string_lossy().to_string())
        .bind(time::to_db_string(&job.created_at))
        .bind(time::to_db_string(&job.updated_at))
        .bind(&job.error_message)
        .bind(results)
        .bind(provenance)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %job.id, "Inserted analysis job");
        Ok(())
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, recording_path, created_at, updated_at, error_message, results
            FROM analysis_jobs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| job_from_row(&row)).transpose()
    }

    /// Like [`load`](Self::load) but a missing job is an error
    pub async fn get(&self, id: Uuid) -> Result<AnalysisJob> {
        self.load(id).await?.ok_or(AnalysisError::NotFound(id))
    }

    /// All jobs, newest first
    pub async fn list(&self) -> Result<Vec<AnalysisJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, recording_path, created_at, updated_at, error_message, results
            FROM analysis_jobs
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// Completed jobs created at or after `since`, oldest first
    pub async fn list_completed_since(&self, since: DateTime<Utc>) -> Result<Vec<AnalysisJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, recording_path, created_at, updated_at, error_message, results
            FROM analysis_jobs
            WHERE status = ? AND created_at >= ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(JobStatus::Complete.as_str())
        .bind(time::to_db_string(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    /// PROCESSING jobs whose owner has not heartbeated since `stale_before`
    pub async fn stale_processing_ids(&self, stale_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM analysis_jobs
            WHERE status = ? AND (heartbeat_at IS NULL OR heartbeat_at < ?)
            "#,
        )
        .bind(JobStatus::Processing.as_str())
        .bind(time::to_db_string(&stale_before))
        .fetch_all(&self.pool)
        .await?;

        ids.iter().map(|id| parse_uuid(id)).collect()
    }

    /// Owner of a PROCESSING job refreshes its liveness stamp
    ///
    /// Returns false once the job has left PROCESSING or changed owner.
    pub async fn heartbeat(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE analysis_jobs SET heartbeat_at = ? WHERE id = ? AND status = ? AND owner = ?",
        )
        .bind(time::to_db_string(&time::now()))
        .bind(id.to_string())
        .bind(JobStatus::Processing.as_str())
        .bind(owner.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns false when there was no such job
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM analysis_jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// PENDING → PROCESSING, recording the owning controller
    pub async fn begin_processing(&self, id: Uuid, owner: Uuid) -> Result<StateTransition> {
        self.transition(id, JobStatus::Pending, JobStatus::Processing, FieldUpdate::Claim { owner })
            .await
    }

    /// PROCESSING → COMPLETE, storing results and their provenance
    pub async fn complete(&self, id: Uuid, results: &AnalysisResults) -> Result<StateTransition> {
        let update = FieldUpdate::Results {
            results: serde_json::to_string(results)?,
            provenance: serde_json::to_string(&results.provenance())?,
        };
        self.transition(id, JobStatus::Processing, JobStatus::Complete, update)
            .await
    }

    /// PROCESSING → FAILED
    pub async fn fail(&self, id: Uuid, message: &str) -> Result<StateTransition> {
        self.transition(
            id,
            JobStatus::Processing,
            JobStatus::Failed,
            FieldUpdate::Error(message.to_string()),
        )
        .await
    }

    /// PROCESSING → FAILED for a job whose owner is gone, making it retryable
    pub async fn fail_abandoned(&self, id: Uuid) -> Result<StateTransition> {
        self.fail(id, ABANDONED_MESSAGE).await
    }

    /// PROCESSING → CANCELLED; stored fields are left as they are
    pub async fn cancel(&self, id: Uuid, reason: &str) -> Result<StateTransition> {
        self.transition(
            id,
            JobStatus::Processing,
            JobStatus::Cancelled,
            FieldUpdate::Error(reason.to_string()),
        )
        .await
    }

    /// FAILED → PENDING, clearing results, provenance, error message and owner
    pub async fn reset_for_retry(&self, id: Uuid) -> Result<StateTransition> {
        self.transition(id, JobStatus::Failed, JobStatus::Pending, FieldUpdate::Clear)
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        update: FieldUpdate,
    ) -> Result<StateTransition> {
        let transition = StateTransition::new(id, from, to)?;

        let id_str = id.to_string();
        let now = time::to_db_string(&transition.transitioned_at);
        let query = match &update {
            FieldUpdate::Claim { owner } => sqlx::query(
                "UPDATE analysis_jobs SET status = ?, updated_at = ?, owner = ?, heartbeat_at = ? \
                 WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(&now)
            .bind(owner.to_string())
            .bind(&now),
            FieldUpdate::Error(message) => sqlx::query(
                "UPDATE analysis_jobs SET status = ?, updated_at = ?, error_message = ? \
                 WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(&now)
            .bind(message),
            FieldUpdate::Results { results, provenance } => sqlx::query(
                "UPDATE analysis_jobs SET status = ?, updated_at = ?, error_message = NULL, \
                 results = ?, provenance = ? WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(&now)
            .bind(results)
            .bind(provenance),
            FieldUpdate::Clear => sqlx::query(
                "UPDATE analysis_jobs SET status = ?, updated_at = ?, error_message = NULL, \
                 results = NULL, provenance = NULL, owner = NULL, heartbeat_at = NULL \
                 WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(&now),
        };

        let result = query
            .bind(&id_str)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return match self.load(id).await? {
                None => Err(AnalysisError::NotFound(id)),
                Some(job) if job.status.can_transition_to(to) || job.status == from => {
                    Err(AnalysisError::Conflict { id, expected: from })
                }
                Some(job) => Err(InvalidTransition { from: job.status, to }.into()),
            };
        }

        debug!(job_id = %id, from = %from, to = %to, "Job status changed");
        Ok(transition)
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| vbm_common::Error::Internal(format!("Invalid job id '{}': {}", value, e)).into())
}

fn job_from_row(row: &SqliteRow) -> Result<AnalysisJob> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(vbm_common::Error::Internal)?;
    let recording_path: String = row.try_get("recording_path")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let results: Option<String> = row.try_get("results")?;

    Ok(AnalysisJob {
        id: parse_uuid(&id)?,
        status,
        created_at: time::from_db_string(&created_at)?,
        updated_at: time::from_db_string(&updated_at)?,
        recording_path: PathBuf::from(recording_path),
        error_message: row.try_get("error_message")?,
        results: results.map(|r| serde_json::from_str(&r)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use crate::types::{ExtractionOutcome, MetricResult, Tier};
    use chrono::Duration;
    use tempfile::TempDir;

    async fn store() -> (TempDir, JobStore) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("vbm.db")).await.unwrap();
        (dir, JobStore::new(pool))
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let (_dir, store) = store().await;
        let job = AnalysisJob::new(PathBuf::from("/tmp/r.wav"));
        store.insert(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.recording_path, PathBuf::from("/tmp/r.wav"));
        assert!(loaded.results.is_none());
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let (_dir, store) = store().await;
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(AnalysisError::NotFound(_))));
        assert!(matches!(
            store.begin_processing(id, Uuid::new_v4()).await,
            Err(AnalysisError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transitions_follow_state_machine() {
        let (_dir, store) = store().await;
        let job = AnalysisJob::new(PathBuf::from("r.wav"));
        store.insert(&job).await.unwrap();

        // PENDING cannot complete
        let err = store.complete(job.id, &AnalysisResults::default()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidTransition(_)));

        let owner = Uuid::new_v4();
        let claimed = store.begin_processing(job.id, owner).await.unwrap();
        assert_eq!(claimed.job_id, job.id);
        assert_eq!(claimed.old_status, JobStatus::Pending);
        assert_eq!(claimed.new_status, JobStatus::Processing);
        // A second dispatch loses the race
        assert!(matches!(
            store.begin_processing(job.id, Uuid::new_v4()).await,
            Err(AnalysisError::InvalidTransition(_))
        ));

        let failed = store.fail(job.id, "no metrics").await.unwrap();
        assert_eq!(failed.new_status, JobStatus::Failed);
        let failed = store.get(job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("no metrics"));

        store.reset_for_retry(job.id).await.unwrap();
        let reset = store.get(job.id).await.unwrap();
        assert_eq!(reset.status, JobStatus::Pending);
        assert!(reset.error_message.is_none());
    }

    #[tokio::test]
    async fn test_cancel_keeps_stored_fields() {
        let (_dir, store) = store().await;
        let mut job = AnalysisJob::new(PathBuf::from("r.wav"));
        job.status = JobStatus::Processing;
        job.results = Some(AnalysisResults::default());
        store.insert(&job).await.unwrap();

        store.cancel(job.id, "shutdown").await.unwrap();
        let cancelled = store.get(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.results.is_some());
    }

    #[tokio::test]
    async fn test_retry_reset_clears_stored_results() {
        let (_dir, store) = store().await;
        let mut job = AnalysisJob::new(PathBuf::from("r.wav"));
        job.status = JobStatus::Failed;
        job.error_message = Some("worker crashed".to_string());
        job.results = Some(AnalysisResults {
            vocal: Some(ExtractionOutcome::new(vec![MetricResult {
                name: "mean_pitch_hz".to_string(),
                value: 150.0,
                unit: "Hz".to_string(),
                tier_used: Tier::Secondary,
                provenance_note: "signal".to_string(),
            }])),
            linguistic: None,
        });
        store.insert(&job).await.unwrap();

        let stored: (Option<String>, Option<String>) =
            sqlx::query_as("SELECT results, provenance FROM analysis_jobs WHERE id = ?")
                .bind(job.id.to_string())
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert!(stored.0.is_some() && stored.1.is_some());

        store.reset_for_retry(job.id).await.unwrap();

        let cleared: (Option<String>, Option<String>, Option<String>) =
            sqlx::query_as("SELECT results, provenance, error_message FROM analysis_jobs WHERE id = ?")
                .bind(job.id.to_string())
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(cleared, (None, None, None));
        let reset = store.get(job.id).await.unwrap();
        assert_eq!(reset.status, JobStatus::Pending);
        assert!(reset.results.is_none());
    }

    #[tokio::test]
    async fn test_stale_processing_rows() {
        let (_dir, store) = store().await;
        let owner = Uuid::new_v4();

        let live = AnalysisJob::new(PathBuf::from("live.wav"));
        store.insert(&live).await.unwrap();
        store.begin_processing(live.id, owner).await.unwrap();

        // Inserted straight into PROCESSING: never heartbeated
        let mut orphan = AnalysisJob::new(PathBuf::from("orphan.wav"));
        orphan.status = JobStatus::Processing;
        store.insert(&orphan).await.unwrap();

        let cutoff = time::now() - Duration::seconds(30);
        assert_eq!(store.stale_processing_ids(cutoff).await.unwrap(), vec![orphan.id]);

        // Once the cutoff passes the live claim, it is stale too
        let later = time::now() + Duration::seconds(1);
        assert_eq!(store.stale_processing_ids(later).await.unwrap().len(), 2);

        assert!(store.heartbeat(live.id, owner).await.unwrap());
        assert!(!store.heartbeat(live.id, Uuid::new_v4()).await.unwrap());
        assert!(!store.heartbeat(orphan.id, owner).await.unwrap());

        let abandoned = store.fail_abandoned(orphan.id).await.unwrap();
        assert_eq!(abandoned.new_status, JobStatus::Failed);
        let failed = store.get(orphan.id).await.unwrap();
        assert_eq!(failed.error_message.as_deref(), Some(ABANDONED_MESSAGE));
        assert!(store.stale_processing_ids(cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_dir, store) = store().await;
        let first = AnalysisJob::new(PathBuf::from("a.wav"));
        let second = AnalysisJob::new(PathBuf::from("b.wav"));
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();
        store.begin_processing(second.id, Uuid::new_v4()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|j| j.id == second.id && j.status == JobStatus::Processing));
        assert!(store.delete(first.id).await.unwrap());
        assert!(!store.delete(first.id).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
