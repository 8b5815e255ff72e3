//! Extraction worker pool
//!
//! A fixed number of OS threads take job descriptions from a shared queue
//! and answer on a per-job oneshot channel. Each worker runs one job to
//! completion before taking the next. A panic inside extraction is caught
//! on the worker and reported as [`WorkerFailure::Panicked`]; the thread
//! keeps serving.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::AnalysisResults;

/// Everything a worker needs to run one job
#[derive(Debug, Clone)]
pub struct JobDescription {
    pub job_id: Uuid,
    /// Seed for deterministic synthetic values
    pub recording_id: String,
    pub recording_path: PathBuf,
}

/// Work executed on a pool thread
///
/// `rt` lets the runner drive async steps (ingest, transcription) from the
/// worker thread.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, job: &JobDescription, rt: &Handle) -> AnalysisResults;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkerFailure {
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// Reply channel closed without an answer
    #[error("worker exited without a result")]
    Lost,

    #[error("worker pool is shutting down")]
    ShuttingDown,
}

type Reply = oneshot::Sender<Result<AnalysisResults, WorkerFailure>>;

struct WorkItem {
    job: JobDescription,
    reply: Reply,
}

struct SharedPoolState {
    queue: Mutex<VecDeque<WorkItem>>,
    condvar: Condvar,
    stop_flag: AtomicBool,
}

impl SharedPoolState {
    fn queue(&self) -> MutexGuard<'_, VecDeque<WorkItem>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct WorkerPool {
    state: Arc<SharedPoolState>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Start `size` worker threads (at least one)
    pub fn new(size: usize, runner: Arc<dyn JobRunner>, rt: Handle) -> Self {
        let size = size.max(1);
        let state = Arc::new(SharedPoolState {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        });

        let mut threads = Vec::with_capacity(size);
        for worker_id in 0..size {
            let state = Arc::clone(&state);
            let runner = Arc::clone(&runner);
            let rt = rt.clone();
            let spawned = thread::Builder::new()
                .name(format!("vbm-worker-{}", worker_id))
                .spawn(move || Self::worker_loop(worker_id, state, runner, rt));
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => error!(worker_id, error = %e, "Failed to start worker thread"),
            }
        }

        info!(workers = threads.len(), "Worker pool started");
        Self {
            state,
            threads: Mutex::new(threads),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn queue_len(&self) -> usize {
        self.state.queue().len()
    }

    /// Queue a job; the receiver yields its outcome
    pub fn submit(
        &self,
        job: JobDescription,
    ) -> Result<oneshot::Receiver<Result<AnalysisResults, WorkerFailure>>, WorkerFailure> {
        if self.state.stop_flag.load(Ordering::Acquire) {
            return Err(WorkerFailure::ShuttingDown);
        }

        let (reply, receiver) = oneshot::channel();
        debug!(job_id = %job.job_id, "Queueing job for worker");
        self.state.queue().push_back(WorkItem { job, reply });
        self.state.condvar.notify_one();
        Ok(receiver)
    }

    /// Submit and wait for the outcome
    pub async fn execute(&self, job: JobDescription) -> Result<AnalysisResults, WorkerFailure> {
        let receiver = self.submit(job)?;
        receiver.await.unwrap_or(Err(WorkerFailure::Lost))
    }

    /// Stop accepting work, answer queued jobs with `ShuttingDown` and join
    /// the threads once their current job is done
    ///
    /// Blocks; call from a blocking context.
    pub fn shutdown(&self) {
        if self.state.stop_flag.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down worker pool");

        let pending: Vec<WorkItem> = self.state.queue().drain(..).collect();
        for item in pending {
            let _ = item.reply.send(Err(WorkerFailure::ShuttingDown));
        }
        self.state.condvar.notify_all();

        let threads: Vec<JoinHandle<()>> = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for (idx, handle) in threads.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker_id = idx, "Worker thread join failed");
            }
        }
        info!("Worker pool shut down");
    }

    fn worker_loop(worker_id: usize, state: Arc<SharedPoolState>, runner: Arc<dyn JobRunner>, rt: Handle) {
        debug!(worker_id, "Worker started");
        loop {
            let item = {
                let mut queue = state.queue();
                while queue.is_empty() && !state.stop_flag.load(Ordering::Acquire) {
                    queue = state
                        .condvar
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if state.stop_flag.load(Ordering::Acquire) {
                    break;
                }
                queue.pop_front()
            };

            let Some(WorkItem { job, reply }) = item else {
                continue;
            };

            debug!(worker_id, job_id = %job.job_id, "Worker picked up job");
            let outcome = catch_unwind(AssertUnwindSafe(|| runner.run(&job, &rt)))
                .map_err(|payload| WorkerFailure::Panicked(panic_message(payload.as_ref())));

            if let Err(failure) = &outcome {
                warn!(worker_id, job_id = %job.job_id, error = %failure, "Extraction crashed");
            }
            if reply.send(outcome).is_err() {
                debug!(worker_id, job_id = %job.job_id, "Job outcome discarded; caller went away");
            }
        }
        debug!(worker_id, "Worker stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.state.stop_flag.store(true, Ordering::Release);
        self.state.condvar.notify_all();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Counting {
        calls: AtomicUsize,
    }

    impl JobRunner for Counting {
        fn run(&self, _: &JobDescription, _: &Handle) -> AnalysisResults {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AnalysisResults::default()
        }
    }

    struct Panicking;

    impl JobRunner for Panicking {
        fn run(&self, job: &JobDescription, _: &Handle) -> AnalysisResults {
            panic!("extraction blew up on {}", job.recording_id);
        }
    }

    struct Slow;

    impl JobRunner for Slow {
        fn run(&self, _: &JobDescription, _: &Handle) -> AnalysisResults {
            thread::sleep(Duration::from_millis(200));
            AnalysisResults::default()
        }
    }

    fn job() -> JobDescription {
        JobDescription {
            job_id: Uuid::new_v4(),
            recording_id: "rec".to_string(),
            recording_path: PathBuf::from("r.wav"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_jobs_run_on_workers() {
        let runner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let pool = WorkerPool::new(2, runner.clone(), Handle::current());
        for _ in 0..4 {
            assert!(pool.execute(job()).await.is_ok());
        }
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
        tokio::task::spawn_blocking(move || pool.shutdown()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panic_is_contained() {
        let pool = WorkerPool::new(1, Arc::new(Panicking), Handle::current());
        let outcome = pool.execute(job()).await;
        match outcome {
            Err(WorkerFailure::Panicked(message)) => assert!(message.contains("blew up on rec")),
            other => panic!("expected a panic failure, got {:?}", other),
        }
        // Same thread keeps serving
        assert!(matches!(pool.execute(job()).await, Err(WorkerFailure::Panicked(_))));
        tokio::task::spawn_blocking(move || pool.shutdown()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_answers_queued_jobs() {
        let pool = Arc::new(WorkerPool::new(1, Arc::new(Slow), Handle::current()));
        let running = pool.submit(job()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let queued = pool.submit(job()).unwrap();

        let stopper = Arc::clone(&pool);
        tokio::task::spawn_blocking(move || stopper.shutdown()).await.unwrap();

        assert!(running.await.unwrap().is_ok());
        assert_eq!(queued.await.unwrap(), Err(WorkerFailure::ShuttingDown));
        assert_eq!(pool.submit(job()).unwrap_err(), WorkerFailure::ShuttingDown);
    }
}
