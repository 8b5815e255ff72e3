//! Speech-to-text through an external whisper-style command
//!
//! Invocation: `<command> -m <model> -l <language> -np -otxt -of <out> -f <input>`.
//! The command writes `<out>.txt`, which is read and then removed whether
//! or not the run succeeded.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{ModelError, SpeechToText};
use crate::config::TranscriberSettings;

#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    command: String,
    model_path: Option<PathBuf>,
    language: String,
    timeout_seconds: u64,
}

impl CommandTranscriber {
    /// None when no command is configured
    pub fn from_settings(settings: &TranscriberSettings) -> Option<Self> {
        let command = settings.command.as_ref()?.trim();
        if command.is_empty() {
            return None;
        }
        Some(Self {
            command: command.to_string(),
            model_path: settings.model_path.clone(),
            language: settings.language.clone(),
            timeout_seconds: settings.timeout_seconds.max(1),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn run(&self, input: &Path, output_base: &Path, output_txt: &Path) -> Result<String, ModelError> {
        let mut command = Command::new(&self.command);
        if let Some(model) = &self.model_path {
            command.arg("-m").arg(model);
        }
        command
            .arg("-l")
            .arg(&self.language)
            .args(["-np", "-otxt", "-of"])
            .arg(output_base)
            .arg("-f")
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.timeout_seconds);
        let result = match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => return Err(ModelError::Timeout(self.timeout_seconds)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModelError::Unavailable(format!("{} not found", self.command)));
            }
            Ok(Err(e)) => return Err(ModelError::Inference(e.to_string())),
            Ok(Ok(result)) => result,
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(ModelError::Inference(format!(
                "{} exited with {}: {}",
                self.command, result.status, last_line
            )));
        }

        let text = tokio::fs::read_to_string(output_txt)
            .await
            .map_err(|e| ModelError::Inference(format!("Failed to read transcript: {}", e)))?;
        Ok(normalize_transcript(&text))
    }
}

#[async_trait]
impl SpeechToText for CommandTranscriber {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn transcribe(&self, path: &Path) -> Result<String, ModelError> {
        let output_base = std::env::temp_dir().join(format!("vbm_transcript_{}", Uuid::new_v4()));
        let output_txt = output_base.with_extension("txt");

        debug!(input = %path.display(), command = %self.command, "Transcribing recording");
        let result = self.run(path, &output_base, &output_txt).await;

        if let Err(e) = tokio::fs::remove_file(&output_txt).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %output_txt.display(), error = %e, "Failed to remove transcript file");
            }
        }

        result
    }
}

/// Collapse whisper's line-per-segment output into one paragraph
fn normalize_transcript(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
