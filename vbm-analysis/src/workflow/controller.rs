//! Analysis job controller
//!
//! Owns the job lifecycle: stores the recording, creates the job, hands
//! extraction to the worker pool and reconciles the job status with the
//! outcome. Status writes go through [`JobStore`] transitions only.
//!
//! Several processes may share one database. Each controller has its own
//! instance id, claims the jobs it runs under that id and heartbeats them
//! while they are on a worker. Shutdown only touches jobs this controller
//! claimed; jobs whose owner stopped heartbeating are failed on the next
//! startup so they can be retried.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::worker_pool::{JobDescription, JobRunner, WorkerFailure, WorkerPool};
use crate::audio::validate_recording;
use crate::config::AnalysisSettings;
use crate::db::JobStore;
use crate::error::{AnalysisError, Result};
use crate::models::{AnalysisJob, AnalysisResults, InvalidTransition, JobStatus};
use crate::reports;

/// Directory under the root folder holding stored recordings
pub const RECORDINGS_DIR: &str = "recordings";

/// How often a running job's liveness stamp is refreshed
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// A PROCESSING job without a heartbeat for this long has lost its owner
pub const ORPHAN_AFTER: Duration = Duration::from_secs(30);

pub struct JobController {
    store: JobStore,
    pool: Arc<WorkerPool>,
    settings: AnalysisSettings,
    recordings_dir: PathBuf,
    shutdown: CancellationToken,
    instance_id: Uuid,
    /// Jobs this controller has claimed and not yet settled
    in_flight: Mutex<HashSet<Uuid>>,
}

impl JobController {
    /// Must be called inside a Tokio runtime; worker threads use its handle
    pub fn new(
        store: JobStore,
        runner: Arc<dyn JobRunner>,
        settings: AnalysisSettings,
        root_folder: &Path,
    ) -> Result<Self> {
        let recordings_dir = root_folder.join(RECORDINGS_DIR);
        std::fs::create_dir_all(&recordings_dir)?;

        let pool = WorkerPool::new(settings.worker_count, runner, tokio::runtime::Handle::current());
        Ok(Self {
            store,
            pool: Arc::new(pool),
            settings,
            recordings_dir,
            shutdown: CancellationToken::new(),
            instance_id: Uuid::new_v4(),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Owner id written on every job this controller claims
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Validate and store a copy of the recording, then create a PENDING job
    pub async fn create_job(&self, source: &Path) -> Result<AnalysisJob> {
        if self.is_shutting_down() {
            return Err(AnalysisError::ShuttingDown);
        }

        validate_recording(source, &self.settings)
            .map_err(|e| AnalysisError::InvalidRecording(e.to_string()))?;
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let mut job = AnalysisJob::new(PathBuf::new());
        job.recording_path = self.recordings_dir.join(format!("{}.{}", job.id, extension));
        tokio::fs::copy(source, &job.recording_path).await?;

        if let Err(e) = self.store.insert(&job).await {
            let _ = tokio::fs::remove_file(&job.recording_path).await;
            return Err(e);
        }

        info!(job_id = %job.id, source = %source.display(), "Analysis job created");
        Ok(job)
    }

    /// Run the job in the background
    pub fn dispatch(self: &Arc<Self>, id: Uuid) -> JoinHandle<Result<JobStatus>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let result = controller.run_job(id).await;
            if let Err(e) = &result {
                error!(job_id = %id, error = %e, "Analysis job dispatch failed");
            }
            result
        })
    }

    /// Run a PENDING job to a final status and return it
    pub async fn run_job(&self, id: Uuid) -> Result<JobStatus> {
        if self.is_shutting_down() {
            return Err(AnalysisError::ShuttingDown);
        }

        let job = self.store.get(id).await?;

        // Registered before the claim so a concurrent shutdown sees it
        self.in_flight().insert(id);
        let claimed = match self.store.begin_processing(id, self.instance_id).await {
            Ok(claimed) => claimed,
            Err(e) => {
                self.in_flight().remove(&id);
                return Err(e);
            }
        };
        debug!(job_id = %id, owner = %self.instance_id, at = %claimed.transitioned_at, "Job processing");

        if self.is_shutting_down() {
            // Claimed after shutdown swept the in-flight set
            if let Err(e) = self.store.cancel(id, "Cancelled by shutdown").await {
                debug!(job_id = %id, error = %e, "Job already cancelled by shutdown");
            }
            return Ok(JobStatus::Cancelled);
        }

        let description = JobDescription {
            job_id: id,
            recording_id: id.to_string(),
            recording_path: job.recording_path,
        };

        let execution = self.pool.execute(description);
        tokio::pin!(execution);
        let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

        let outcome = loop {
            tokio::select! {
                outcome = &mut execution => break outcome,
                _ = self.shutdown.cancelled() => {
                    // shutdown() cancels the jobs left in the in-flight set
                    return Ok(JobStatus::Cancelled);
                }
                _ = heartbeat.tick() => {
                    match self.store.heartbeat(id, self.instance_id).await {
                        Ok(true) => {}
                        Ok(false) => debug!(job_id = %id, "Job left PROCESSING while running"),
                        Err(e) => warn!(job_id = %id, error = %e, "Heartbeat write failed"),
                    }
                }
            }
        };

        let status = match outcome {
            Ok(results) => self.record_results(id, &results).await,
            Err(failure) => self.record_crash(id, &failure).await,
        };
        self.in_flight().remove(&id);
        status
    }

    async fn record_results(&self, id: Uuid, results: &AnalysisResults) -> Result<JobStatus> {
        let fields = results.field_map().len();
        let written = if fields == 0 {
            warn!(job_id = %id, "Neither pipeline produced any field");
            self.store
                .fail(id, "Analysis produced no results")
                .await
                .map(|_| JobStatus::Failed)
        } else {
            self.store.complete(id, results).await.map(|_| JobStatus::Complete)
        };

        match written {
            Ok(status) => {
                info!(job_id = %id, status = %status, fields, "Analysis job finished");
                Ok(status)
            }
            // Cancelled while the worker was busy; the cancellation stands
            Err(AnalysisError::InvalidTransition(_)) | Err(AnalysisError::Conflict { .. }) => {
                let current = self.store.get(id).await?.status;
                warn!(job_id = %id, status = %current, "Results arrived after the job left PROCESSING; discarded");
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }

    /// Worker crash: FAILED, but only if the job is still PROCESSING
    async fn record_crash(&self, id: Uuid, failure: &WorkerFailure) -> Result<JobStatus> {
        let job = self.store.get(id).await?;
        if job.status != JobStatus::Processing {
            debug!(job_id = %id, status = %job.status, "Worker failure after job left PROCESSING");
            return Ok(job.status);
        }

        match failure {
            WorkerFailure::ShuttingDown => {
                self.store.cancel(id, "Worker pool shut down").await?;
                Ok(JobStatus::Cancelled)
            }
            _ => {
                error!(job_id = %id, error = %failure, "Extraction worker crashed");
                self.store.fail(id, &format!("Worker failure: {}", failure)).await?;
                Ok(JobStatus::Failed)
            }
        }
    }

    /// Return a FAILED job to PENDING with its stored fields cleared
    ///
    /// Rejected without any state change when the job is not FAILED or its
    /// recording is gone.
    pub async fn prepare_retry(&self, id: Uuid) -> Result<AnalysisJob> {
        let job = self.store.get(id).await?;
        if job.status != JobStatus::Failed {
            return Err(InvalidTransition {
                from: job.status,
                to: JobStatus::Pending,
            }
            .into());
        }
        if !tokio::fs::try_exists(&job.recording_path).await.unwrap_or(false) {
            return Err(AnalysisError::RecordingMissing(job.recording_path));
        }

        self.store.reset_for_retry(id).await?;
        info!(job_id = %id, "Analysis job reset for retry");
        self.store.get(id).await
    }

    /// Reset a FAILED job and dispatch it again
    pub async fn retry(self: &Arc<Self>, id: Uuid) -> Result<JoinHandle<Result<JobStatus>>> {
        self.prepare_retry(id).await?;
        Ok(self.dispatch(id))
    }

    /// Fail PROCESSING jobs whose owner stopped heartbeating
    ///
    /// Run once at startup. Returns the number of jobs moved to FAILED; each
    /// one can then be retried.
    pub async fn recover_orphaned_jobs(&self) -> Result<usize> {
        let stale_before = Utc::now() - ChronoDuration::seconds(ORPHAN_AFTER.as_secs() as i64);

        let mut recovered = 0;
        for id in self.store.stale_processing_ids(stale_before).await? {
            if self.in_flight().contains(&id) {
                continue;
            }
            match self.store.fail_abandoned(id).await {
                Ok(_) => {
                    warn!(job_id = %id, "Recovered job abandoned by a stopped process");
                    recovered += 1;
                }
                Err(e) => debug!(job_id = %id, error = %e, "Abandoned job changed before recovery"),
            }
        }
        if recovered > 0 {
            info!(recovered, "Abandoned jobs marked FAILED");
        }
        Ok(recovered)
    }

    /// Cancel this controller's in-flight jobs and stop the worker pool
    ///
    /// Returns the number of jobs moved from PROCESSING to CANCELLED. Jobs
    /// claimed by other controllers on the same database are left alone.
    pub async fn shutdown(&self) -> Result<usize> {
        info!("Analysis controller shutting down");
        self.shutdown.cancel();

        let claimed: Vec<Uuid> = self.in_flight().drain().collect();
        let mut cancelled = 0;
        for id in claimed {
            match self.store.cancel(id, "Cancelled by shutdown").await {
                Ok(_) => cancelled += 1,
                Err(e) => debug!(job_id = %id, error = %e, "Job left PROCESSING before cancel"),
            }
        }

        let pool = Arc::clone(&self.pool);
        if let Err(e) = tokio::task::spawn_blocking(move || pool.shutdown()).await {
            error!(error = %e, "Worker pool shutdown task failed");
        }

        info!(cancelled, "Analysis controller stopped");
        Ok(cancelled)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<AnalysisJob> {
        self.store.get(id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<AnalysisJob>> {
        self.store.list().await
    }

    /// Remove the job record and its stored recording
    pub async fn delete_job(&self, id: Uuid) -> Result<()> {
        let job = self.store.get(id).await?;
        if job.status == JobStatus::Processing {
            return Err(AnalysisError::Busy(id));
        }

        self.store.delete(id).await?;
        match tokio::fs::remove_file(&job.recording_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %id, error = %e, "Failed to remove stored recording"),
        }
        info!(job_id = %id, "Analysis job deleted");
        Ok(())
    }

    /// Rule-based summary over jobs completed in the last `days` days
    pub async fn weekly_summary(&self, days: i64) -> Result<String> {
        let since = Utc::now() - ChronoDuration::days(days.max(1));
        let jobs = self.store.list_completed_since(since).await?;
        let results: Vec<AnalysisResults> = jobs.into_iter().filter_map(|job| job.results).collect();
        Ok(reports::weekly_summary(&results))
    }
}
