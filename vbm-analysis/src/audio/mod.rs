//! Audio ingest
//!
//! Turns a recording on disk into a [`NormalizedAudio`] buffer: mono f32 at
//! the analysis sample rate. Containers the decoder cannot read go through
//! the external converter first; the converted temporary file never
//! outlives the load.

pub mod converter;
pub mod decoder;
pub mod resampler;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub use converter::{AudioConverter, ConvertedAudio};
pub use decoder::{decode_audio_file, DecodedAudio};

use crate::config::AnalysisSettings;

/// Why a recording could not be loaded
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Recording not found: {0}")]
    NotFound(PathBuf),

    #[error("Recording is empty: {0}")]
    Empty(PathBuf),

    #[error("Recording is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported recording format: {0}")]
    UnsupportedExtension(String),

    #[error("Converter not available: {0}")]
    ConverterUnavailable(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Conversion timed out after {0} s")]
    ConversionTimeout(u64),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Resample error: {0}")]
    Resample(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono buffer at a known sample rate
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    /// Recording the buffer was loaded from
    pub source: PathBuf,
}

impl NormalizedAudio {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, source: impl Into<PathBuf>) -> Self {
        let duration_seconds = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        Self {
            samples,
            sample_rate,
            duration_seconds,
            source: source.into(),
        }
    }

    /// Copy of this buffer at another sample rate
    pub fn resample(&self, target_rate: u32) -> Result<Self, IngestError> {
        let samples = resampler::resample_mono(&self.samples, self.sample_rate, target_rate)?;
        Ok(Self::from_samples(samples, target_rate, self.source.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Check a recording before a job is created for it
///
/// The file must exist, be non-empty, fit the size limit and carry an
/// accepted extension.
pub fn validate_recording(path: &Path, settings: &AnalysisSettings) -> Result<u64, IngestError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(IngestError::NotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IngestError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(IngestError::Io(e)),
    };

    let size = metadata.len();
    if size == 0 {
        return Err(IngestError::Empty(path.to_path_buf()));
    }
    if size > settings.max_file_size_bytes {
        return Err(IngestError::TooLarge {
            size,
            limit: settings.max_file_size_bytes,
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !settings.is_allowed_extension(extension) {
        return Err(IngestError::UnsupportedExtension(extension.to_string()));
    }

    Ok(size)
}

/// Loads recordings into normalized buffers
#[derive(Debug, Clone)]
pub struct AudioIngest {
    converter: AudioConverter,
    settings: AnalysisSettings,
}

impl AudioIngest {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self {
            converter: AudioConverter::new(settings.converter.clone()),
            settings,
        }
    }

    pub fn converter(&self) -> &AudioConverter {
        &self.converter
    }

    /// Validate, convert if needed, decode and resample to `target_rate`
    pub async fn load(&self, path: &Path, target_rate: u32) -> Result<NormalizedAudio, IngestError> {
        validate_recording(path, &self.settings)?;

        // Keeps the converted file alive until decoding is done
        let converted = if self.converter.needs_conversion(path) {
            Some(self.converter.convert(path, target_rate).await?)
        } else {
            None
        };
        let decode_path = converted.as_ref().map(|c| c.path()).unwrap_or(path).to_path_buf();

        let decoded = tokio::task::spawn_blocking(move || decode_audio_file(&decode_path))
            .await
            .map_err(|e| IngestError::Decode(format!("Decoder task failed: {}", e)))??;
        drop(converted);

        debug!(
            path = %path.display(),
            native_rate = decoded.sample_rate,
            channels = decoded.channels,
            "Decoded recording"
        );

        let samples = resampler::resample_mono(&decoded.samples, decoded.sample_rate, target_rate)?;
        let audio = NormalizedAudio::from_samples(samples, target_rate, path);

        info!(
            path = %path.display(),
            sample_rate = target_rate,
            duration_seconds = format!("{:.2}", audio.duration_seconds),
            "Recording loaded"
        );

        Ok(audio)
    }
}
