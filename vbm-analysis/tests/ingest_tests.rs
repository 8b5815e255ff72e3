//! Recording ingest: decode, mixdown, resample and conversion failures

mod helpers;

use std::sync::Arc;
use tempfile::TempDir;

use helpers::{create_test_controller, generate_test_wav, AudioConfig, Content};
use vbm_analysis::audio::{AudioIngest, IngestError};
use vbm_analysis::config::{AnalysisSettings, ConverterSettings};
use vbm_analysis::linguistic::models::ModelRegistry;
use vbm_analysis::models::JobStatus;
use vbm_analysis::workflow::AnalysisServices;

#[tokio::test]
async fn test_stereo_recording_is_mixed_and_resampled() {
    let dir = TempDir::new().unwrap();
    let config = AudioConfig {
        duration_seconds: 2.0,
        sample_rate: 44_100,
        channels: 2,
        content: Content::Voiced(200.0),
    };
    let wav = generate_test_wav(&dir.path().join("stereo.wav"), &config).unwrap();

    let audio = AudioIngest::new(AnalysisSettings::default())
        .load(&wav, 22_050)
        .await
        .unwrap();

    assert_eq!(audio.sample_rate, 22_050);
    assert!((audio.duration_seconds - 2.0).abs() < 0.05, "got {}", audio.duration_seconds);
    assert!(audio.samples.iter().all(|s| s.is_finite()));
    assert_eq!(audio.source, wav);
}

#[tokio::test]
async fn test_corrupt_recording_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.wav");
    std::fs::write(&path, b"RIFF but not really a wave file").unwrap();

    let result = AudioIngest::new(AnalysisSettings::default()).load(&path, 22_050).await;
    assert!(matches!(result, Err(IngestError::Decode(_))));
}

#[tokio::test]
async fn test_missing_converter_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.webm");
    std::fs::write(&path, b"webm bytes").unwrap();

    let settings = AnalysisSettings {
        converter: ConverterSettings {
            command: "vbm-no-such-converter".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    let result = AudioIngest::new(settings).load(&path, 22_050).await;
    assert!(matches!(result, Err(IngestError::ConverterUnavailable(cmd)) if cmd == "vbm-no-such-converter"));
}

#[tokio::test]
async fn test_oversized_recording_is_rejected_before_decoding() {
    let dir = TempDir::new().unwrap();
    let wav = generate_test_wav(&dir.path().join("big.wav"), &AudioConfig::default()).unwrap();
    let settings = AnalysisSettings {
        max_file_size_bytes: 1024,
        ..Default::default()
    };

    let result = AudioIngest::new(settings).load(&wav, 22_050).await;
    assert!(matches!(result, Err(IngestError::TooLarge { limit: 1024, .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_undecodable_recording_fails_its_job() {
    let dir = TempDir::new().unwrap();
    let services = AnalysisServices::new(AnalysisSettings::default(), Arc::new(ModelRegistry::empty()));
    let controller = create_test_controller(&dir, Arc::new(services)).await;

    let path = dir.path().join("broken.wav");
    std::fs::write(&path, b"RIFF but not really a wave file").unwrap();
    let job = controller.create_job(&path).await.unwrap();

    // No vocal outcome and no transcript: nothing to store
    assert_eq!(controller.run_job(job.id).await.unwrap(), JobStatus::Failed);
    let stored = controller.get_job(job.id).await.unwrap();
    assert_eq!(stored.error_message.as_deref(), Some("Analysis produced no results"));

    controller.shutdown().await.unwrap();
}
