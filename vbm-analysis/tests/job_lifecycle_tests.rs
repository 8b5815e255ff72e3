//! Analysis job state machine through the controller
//!
//! Worker pool threads drive async work through the runtime handle, so every
//! test here runs on the multi-thread runtime.

mod helpers;

use std::sync::Arc;
use tempfile::TempDir;

use helpers::{
    create_test_controller, generate_test_wav, wait_for_status, AudioConfig, Content, EmptyRunner, FlakyRunner,
    GatedRunner, StaticResultsRunner,
};
use vbm_analysis::config::AnalysisSettings;
use vbm_analysis::extraction::catalog::{MEAN_PITCH_HZ, SPEECH_RATE_SPS};
use vbm_analysis::linguistic::models::ModelRegistry;
use vbm_analysis::models::{AnalysisJob, JobStatus};
use vbm_analysis::types::Tier;
use vbm_analysis::workflow::AnalysisServices;
use vbm_analysis::AnalysisError;

fn recording(dir: &TempDir, name: &str, content: Content) -> std::path::PathBuf {
    let config = AudioConfig {
        content,
        ..Default::default()
    };
    generate_test_wav(&dir.path().join(name), &config).unwrap()
}

fn services() -> AnalysisServices {
    AnalysisServices::new(AnalysisSettings::default(), Arc::new(ModelRegistry::empty()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lifecycle_pending_processing_complete() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(GatedRunner::new());
    let gate = Arc::clone(&runner.gate);
    let controller = create_test_controller(&dir, runner).await;

    let source = recording(&dir, "input.wav", Content::Voiced(160.0));
    let job = controller.create_job(&source).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.recording_path.starts_with(controller.recordings_dir()));
    assert!(job.recording_path.exists());

    let handle = controller.dispatch(job.id);
    wait_for_status(&controller, job.id, JobStatus::Processing).await;

    tokio::task::spawn_blocking(move || gate.wait()).await.unwrap();
    assert_eq!(handle.await.unwrap().unwrap(), JobStatus::Complete);

    let stored = controller.get_job(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Complete);
    assert_eq!(stored.results, Some(StaticResultsRunner::results()));
    assert!(stored.error_message.is_none());

    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_without_fields_fails() {
    let dir = TempDir::new().unwrap();
    let controller = create_test_controller(&dir, Arc::new(EmptyRunner)).await;
    let job = controller
        .create_job(&recording(&dir, "input.wav", Content::Silence))
        .await
        .unwrap();

    assert_eq!(controller.run_job(job.id).await.unwrap(), JobStatus::Failed);
    let stored = controller.get_job(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.results.is_none());
    assert!(stored.error_message.is_some());

    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retry_is_only_allowed_from_failed() {
    let dir = TempDir::new().unwrap();
    let controller = create_test_controller(&dir, Arc::new(StaticResultsRunner::default())).await;

    let pending = controller
        .create_job(&recording(&dir, "a.wav", Content::Silence))
        .await
        .unwrap();
    let err = controller.prepare_retry(pending.id).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidTransition(_)));

    let complete = controller
        .create_job(&recording(&dir, "b.wav", Content::Silence))
        .await
        .unwrap();
    assert_eq!(controller.run_job(complete.id).await.unwrap(), JobStatus::Complete);
    let err = controller.retry(complete.id).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidTransition(_)));

    // Rejections leave both jobs untouched
    assert_eq!(controller.get_job(pending.id).await.unwrap().status, JobStatus::Pending);
    assert_eq!(controller.get_job(complete.id).await.unwrap().status, JobStatus::Complete);

    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_crash_fails_job_and_retry_recovers() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FlakyRunner::new(StaticResultsRunner::default()));
    let controller = create_test_controller(&dir, runner).await;
    let job = controller
        .create_job(&recording(&dir, "input.wav", Content::Voiced(120.0)))
        .await
        .unwrap();

    assert_eq!(controller.run_job(job.id).await.unwrap(), JobStatus::Failed);
    let failed = controller.get_job(job.id).await.unwrap();
    assert!(failed.error_message.unwrap().contains("worker killed"));

    let reset = controller.prepare_retry(job.id).await.unwrap();
    assert_eq!(reset.status, JobStatus::Pending);
    assert!(reset.results.is_none());
    assert!(reset.error_message.is_none());

    assert_eq!(controller.run_job(job.id).await.unwrap(), JobStatus::Complete);
    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retry_without_recording_is_rejected() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(FlakyRunner::new(StaticResultsRunner::default()));
    let controller = create_test_controller(&dir, runner).await;
    let job = controller
        .create_job(&recording(&dir, "input.wav", Content::Silence))
        .await
        .unwrap();
    assert_eq!(controller.run_job(job.id).await.unwrap(), JobStatus::Failed);

    std::fs::remove_file(&job.recording_path).unwrap();
    let err = controller.retry(job.id).await.unwrap_err();
    assert!(matches!(err, AnalysisError::RecordingMissing(path) if path == job.recording_path));
    assert_eq!(controller.get_job(job.id).await.unwrap().status, JobStatus::Failed);

    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_processing_jobs() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(GatedRunner::new());
    let gate = Arc::clone(&runner.gate);
    let controller = create_test_controller(&dir, runner).await;
    let job = controller
        .create_job(&recording(&dir, "input.wav", Content::Silence))
        .await
        .unwrap();

    let handle = controller.dispatch(job.id);
    wait_for_status(&controller, job.id, JobStatus::Processing).await;

    // Release the worker once shutdown has marked the job
    let release = tokio::task::spawn_blocking(move || gate.wait());
    assert_eq!(controller.shutdown().await.unwrap(), 1);
    release.await.unwrap();

    assert_eq!(handle.await.unwrap().unwrap(), JobStatus::Cancelled);
    let stored = controller.get_job(job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.results.is_none());

    let err = controller
        .create_job(&recording(&dir, "late.wav", Content::Silence))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::ShuttingDown));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_leaves_other_controllers_jobs_alone() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(GatedRunner::new());
    let gate = Arc::clone(&runner.gate);
    let analyzer = create_test_controller(&dir, runner).await;
    // Second process on the same root folder, e.g. `list` in another terminal
    let lister = create_test_controller(&dir, Arc::new(EmptyRunner)).await;
    assert_ne!(analyzer.instance_id(), lister.instance_id());

    let job = analyzer
        .create_job(&recording(&dir, "input.wav", Content::Silence))
        .await
        .unwrap();
    let handle = analyzer.dispatch(job.id);
    wait_for_status(&analyzer, job.id, JobStatus::Processing).await;

    // A live claim is not mistaken for an abandoned one
    assert_eq!(lister.recover_orphaned_jobs().await.unwrap(), 0);
    assert_eq!(lister.list_jobs().await.unwrap().len(), 1);
    assert_eq!(lister.shutdown().await.unwrap(), 0);
    assert_eq!(analyzer.get_job(job.id).await.unwrap().status, JobStatus::Processing);

    tokio::task::spawn_blocking(move || gate.wait()).await.unwrap();
    assert_eq!(handle.await.unwrap().unwrap(), JobStatus::Complete);
    assert_eq!(analyzer.shutdown().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_processing_job_becomes_retryable() {
    let dir = TempDir::new().unwrap();
    let controller = create_test_controller(&dir, Arc::new(StaticResultsRunner::default())).await;

    // Left behind by a process killed mid-run: PROCESSING, never heartbeated
    let path = controller.recordings_dir().join("abandoned.wav");
    generate_test_wav(&path, &AudioConfig::default()).unwrap();
    let mut job = AnalysisJob::new(path);
    job.status = JobStatus::Processing;
    controller.store().insert(&job).await.unwrap();

    assert!(matches!(controller.delete_job(job.id).await, Err(AnalysisError::Busy(_))));

    assert_eq!(controller.recover_orphaned_jobs().await.unwrap(), 1);
    let failed = controller.get_job(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error_message.unwrap().contains("stopped responding"));

    // Recovery only fires once
    assert_eq!(controller.recover_orphaned_jobs().await.unwrap(), 0);

    let handle = controller.retry(job.id).await.unwrap();
    assert_eq!(handle.await.unwrap().unwrap(), JobStatus::Complete);
    assert!(controller.get_job(job.id).await.unwrap().results.is_some());

    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_recording_completes_with_synthetic_metrics() {
    let dir = TempDir::new().unwrap();
    let controller = create_test_controller(&dir, Arc::new(services())).await;
    let config = AudioConfig {
        duration_seconds: 3.0,
        content: Content::Silence,
        ..Default::default()
    };
    let source = generate_test_wav(&dir.path().join("silence.wav"), &config).unwrap();
    let job = controller.create_job(&source).await.unwrap();

    assert_eq!(controller.run_job(job.id).await.unwrap(), JobStatus::Complete);

    let results = controller.get_job(job.id).await.unwrap().results.unwrap();
    let vocal = results.vocal.as_ref().unwrap();
    assert_eq!(vocal.get(MEAN_PITCH_HZ).unwrap().tier_used, Tier::Emergency);
    assert!(vocal.value(SPEECH_RATE_SPS).unwrap().abs() < 1e-9);
    // No speech-to-text configured: empty transcript, no linguistic fields
    assert!(!results.field_map().contains_key("transcript_text"));

    let provenance = results.provenance();
    assert!(provenance.metrics[MEAN_PITCH_HZ].note.starts_with("synthetic:"));

    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_recording_is_rejected_without_a_job() {
    let dir = TempDir::new().unwrap();
    let controller = create_test_controller(&dir, Arc::new(EmptyRunner)).await;
    let text = dir.path().join("notes.txt");
    std::fs::write(&text, "not audio").unwrap();

    let err = controller.create_job(&text).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidRecording(_)));
    assert!(controller.list_jobs().await.unwrap().is_empty());

    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_removes_job_and_recording() {
    let dir = TempDir::new().unwrap();
    let controller = create_test_controller(&dir, Arc::new(StaticResultsRunner::default())).await;
    let job = controller
        .create_job(&recording(&dir, "input.wav", Content::Silence))
        .await
        .unwrap();
    controller.run_job(job.id).await.unwrap();

    controller.delete_job(job.id).await.unwrap();
    assert!(!job.recording_path.exists());
    assert!(matches!(
        controller.get_job(job.id).await.unwrap_err(),
        AnalysisError::NotFound(id) if id == job.id
    ));

    controller.shutdown().await.unwrap();
}
