//! Configuration resolution for vbm-analysis
//!
//! Settings come from the `[analysis]` table of the bootstrap TOML file,
//! then environment variables override individual keys, and anything left
//! unset takes the built-in default below.
//!
//! ```toml
//! [analysis]
//! worker_count = 2
//! toolkit_enabled = true
//!
//! [analysis.converter]
//! command = "ffmpeg"
//! timeout_seconds = 60
//!
//! [analysis.transcriber]
//! command = "whisper-cli"
//! model_path = "/opt/models/ggml-base.en.bin"
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;
use vbm_common::{Error, Result};

/// Environment override for the converter binary
pub const ENV_CONVERTER_COMMAND: &str = "VBM_CONVERTER_COMMAND";
/// Environment override for the speech-to-text binary
pub const ENV_TRANSCRIBER_COMMAND: &str = "VBM_TRANSCRIBER_COMMAND";
/// Environment override for the speech-to-text model file
pub const ENV_TRANSCRIBER_MODEL: &str = "VBM_TRANSCRIBER_MODEL";
/// Environment override for the maximum recording size in bytes
pub const ENV_MAX_FILE_SIZE: &str = "VBM_MAX_FILE_SIZE";

/// All analysis settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Concurrent extraction runs
    pub worker_count: usize,

    /// Sample rate the vocal pipeline analyses at
    pub vocal_sample_rate: u32,

    /// Sample rate handed to speech-to-text
    pub transcription_sample_rate: u32,

    /// Largest accepted recording
    pub max_file_size_bytes: u64,

    /// Accepted recording extensions (lowercase, no dot)
    pub allowed_extensions: Vec<String>,

    /// When false the toolkit probe always fails and primary vocal
    /// providers are skipped
    pub toolkit_enabled: bool,

    /// Relative spread of the deterministic perturbation applied to
    /// synthetic values
    pub emergency_spread: f64,

    pub converter: ConverterSettings,
    pub transcriber: TranscriberSettings,
    pub linguistic: LinguisticSettings,
}

/// External audio converter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    pub command: String,
    pub timeout_seconds: u64,
    /// Extensions the decoder cannot read natively
    pub extensions: Vec<String>,
}

/// External speech-to-text provider
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriberSettings {
    /// Binary to run; unset means transcription is unavailable
    pub command: Option<String>,
    pub model_path: Option<PathBuf>,
    pub language: String,
    pub timeout_seconds: u64,
}

/// Text analysis thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinguisticSettings {
    /// Texts shorter than this get the fixed short-text analysis
    pub min_text_chars: usize,
    /// Sentences shorter than this are not classified
    pub min_sentence_chars: usize,
    /// Texts shorter than this are returned unchanged as their own summary
    pub summary_min_content_chars: usize,
    pub summary_max_length: usize,
    pub summary_min_length: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            worker_count: 2,
            vocal_sample_rate: 22_050,
            transcription_sample_rate: 16_000,
            max_file_size_bytes: 50 * 1024 * 1024,
            allowed_extensions: ["wav", "mp3", "m4a", "flac", "webm", "ogg", "opus", "aac"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            toolkit_enabled: true,
            emergency_spread: 0.1,
            converter: ConverterSettings::default(),
            transcriber: TranscriberSettings::default(),
            linguistic: LinguisticSettings::default(),
        }
    }
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            command: "ffmpeg".to_string(),
            timeout_seconds: 60,
            extensions: ["webm", "opus", "m4a", "aac"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for TranscriberSettings {
    fn default() -> Self {
        Self {
            command: None,
            model_path: None,
            language: "en".to_string(),
            timeout_seconds: 300,
        }
    }
}

impl Default for LinguisticSettings {
    fn default() -> Self {
        Self {
            min_text_chars: 5,
            min_sentence_chars: 3,
            summary_min_content_chars: 100,
            summary_max_length: 150,
            summary_min_length: 30,
        }
    }
}

impl AnalysisSettings {
    /// Resolve settings: TOML `[analysis]` table → environment → defaults
    pub fn resolve(document: &toml::Table) -> Result<Self> {
        let mut settings = Self::from_document(document)?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read the `[analysis]` table; a missing table means all defaults
    pub fn from_document(document: &toml::Table) -> Result<Self> {
        match document.get("analysis") {
            Some(value) => value
                .clone()
                .try_into()
                .map_err(|e| Error::Config(format!("Invalid [analysis] section: {}", e))),
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(command) = non_empty_env(ENV_CONVERTER_COMMAND) {
            info!("Converter command loaded from environment variable");
            self.converter.command = command;
        }

        if let Some(command) = non_empty_env(ENV_TRANSCRIBER_COMMAND) {
            info!("Transcriber command loaded from environment variable");
            self.transcriber.command = Some(command);
        }

        if let Some(model) = non_empty_env(ENV_TRANSCRIBER_MODEL) {
            self.transcriber.model_path = Some(PathBuf::from(model));
        }

        if let Some(size) = non_empty_env(ENV_MAX_FILE_SIZE) {
            self.max_file_size_bytes = size.parse().map_err(|e| {
                Error::Config(format!("{} must be a byte count: {}", ENV_MAX_FILE_SIZE, e))
            })?;
        }

        Ok(())
    }

    /// Reject settings the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".to_string()));
        }
        if self.vocal_sample_rate < 8_000 || self.transcription_sample_rate < 8_000 {
            return Err(Error::Config(
                "sample rates below 8000 Hz are not supported".to_string(),
            ));
        }
        if !(0.0..=0.5).contains(&self.emergency_spread) {
            return Err(Error::Config(
                "emergency_spread must be between 0.0 and 0.5".to_string(),
            ));
        }
        if self.converter.timeout_seconds == 0 {
            return Err(Error::Config(
                "converter.timeout_seconds must be positive".to_string(),
            ));
        }
        if self.linguistic.summary_max_length < 4 {
            return Err(Error::Config(
                "linguistic.summary_max_length must be at least 4".to_string(),
            ));
        }
        Ok(())
    }

    /// True when the extension (case-insensitive) is accepted
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| *e == extension)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
