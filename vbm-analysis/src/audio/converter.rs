//! External format converter
//!
//! Containers the decoder cannot read (webm, opus, m4a, aac by default) are
//! converted to mono 16-bit PCM WAV by an external tool. The WAV lives in
//! the system temp directory and is deleted when its [`ConvertedAudio`]
//! guard drops.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use super::IngestError;
use crate::config::ConverterSettings;

/// Temporary converted WAV, removed on drop
#[derive(Debug)]
pub struct ConvertedAudio {
    path: PathBuf,
}

impl ConvertedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConvertedAudio {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed converted audio"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove converted audio"),
        }
    }
}

/// Wrapper around the converter command
#[derive(Debug, Clone)]
pub struct AudioConverter {
    settings: ConverterSettings,
}

impl AudioConverter {
    pub fn new(settings: ConverterSettings) -> Self {
        Self { settings }
    }

    /// True when the decoder cannot read this container directly
    pub fn needs_conversion(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.settings.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }

    /// Convert to mono 16-bit PCM WAV at `sample_rate`
    ///
    /// The output file is removed on every failure path; on success it is
    /// owned by the returned guard.
    pub async fn convert(&self, input: &Path, sample_rate: u32) -> Result<ConvertedAudio, IngestError> {
        let output = ConvertedAudio {
            path: std::env::temp_dir().join(format!("vbm_convert_{}.wav", Uuid::new_v4())),
        };

        debug!(
            input = %input.display(),
            output = %output.path.display(),
            command = %self.settings.command,
            "Converting recording"
        );

        let child = Command::new(&self.settings.command)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-acodec", "pcm_s16le", "-ar"])
            .arg(sample_rate.to_string())
            .args(["-ac", "1"])
            .arg(&output.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let timeout = Duration::from_secs(self.settings.timeout_seconds);
        let result = match tokio::time::timeout(timeout, child).await {
            Err(_) => return Err(IngestError::ConversionTimeout(self.settings.timeout_seconds)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::ConverterUnavailable(self.settings.command.clone()));
            }
            Ok(Err(e)) => return Err(IngestError::Io(e)),
            Ok(Ok(result)) => result,
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(IngestError::ConversionFailed(format!(
                "{} exited with {}: {}",
                self.settings.command, result.status, last_line
            )));
        }

        if !output.path.exists() {
            return Err(IngestError::ConversionFailed(
                "converter reported success but wrote no output".to_string(),
            ));
        }

        Ok(output)
    }
}
