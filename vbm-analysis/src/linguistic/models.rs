//! Model seams for the linguistic pipeline
//!
//! Each model is optional. A missing model, or one that fails on a given
//! input, sends that stage to its keyword-rule fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::transcriber::CommandTranscriber;
use crate::config::TranscriberSettings;

/// Model failure for one input
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// Model not loaded or not configured
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Model ran but produced nothing usable
    #[error("model returned no output")]
    EmptyOutput,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model timed out after {0}s")]
    Timeout(u64),
}

// ============================================================================
// Labels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POSITIVE",
            SentimentLabel::Negative => "NEGATIVE",
            SentimentLabel::Neutral => "NEUTRAL",
        }
    }

    /// Bucket a normalized polarity score: > 0.6 positive, < 0.4 negative
    pub fn from_score(score: f64) -> Self {
        if score > 0.6 {
            SentimentLabel::Positive
        } else if score < 0.4 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Disgust,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Disgust => "disgust",
            Emotion::Neutral => "neutral",
        }
    }

    /// Case-insensitive label lookup for model output
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|e| e.as_str() == label)
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueAct {
    Statement,
    Question,
    Request,
    Greeting,
    Farewell,
    Agreement,
    Disagreement,
}

impl DialogueAct {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueAct::Statement => "statement",
            DialogueAct::Question => "question",
            DialogueAct::Request => "request",
            DialogueAct::Greeting => "greeting",
            DialogueAct::Farewell => "farewell",
            DialogueAct::Agreement => "agreement",
            DialogueAct::Disagreement => "disagreement",
        }
    }
}

impl std::fmt::Display for DialogueAct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Model traits
// ============================================================================

/// Speech-to-text over a recording on disk
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(&self, path: &Path) -> Result<String, ModelError>;
}

/// Sentence sentiment: label plus model confidence in `[0, 1]`
pub trait SentimentModel: Send + Sync {
    fn classify(&self, text: &str) -> Result<(SentimentLabel, f64), ModelError>;
}

/// Sentence emotion: label plus model confidence in `[0, 1]`
pub trait EmotionModel: Send + Sync {
    fn classify(&self, text: &str) -> Result<(Emotion, f64), ModelError>;
}

pub trait DialogueModel: Send + Sync {
    fn classify(&self, text: &str) -> Result<DialogueAct, ModelError>;
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, max_length: usize, min_length: usize) -> Result<String, ModelError>;
}

// ============================================================================
// Registry
// ============================================================================

/// Load-once holder of the optional models
///
/// Built by the binary at startup and shared by every run.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    speech_to_text: Option<Arc<dyn SpeechToText>>,
    sentiment: Option<Arc<dyn SentimentModel>>,
    emotion: Option<Arc<dyn EmotionModel>>,
    dialogue: Option<Arc<dyn DialogueModel>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ModelRegistry {
    /// No models at all: keyword rules for every stage
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry from configuration
    ///
    /// Only speech-to-text is configurable; classification runs on the
    /// keyword rules.
    pub fn load(settings: &TranscriberSettings) -> Self {
        let mut registry = Self::empty();
        if let Some(transcriber) = CommandTranscriber::from_settings(settings) {
            info!(command = transcriber.command(), "Speech-to-text provider configured");
            registry = registry.with_speech_to_text(Arc::new(transcriber));
        } else {
            info!("No speech-to-text provider configured; transcripts will be empty");
        }
        registry
    }

    pub fn with_speech_to_text(mut self, model: Arc<dyn SpeechToText>) -> Self {
        self.speech_to_text = Some(model);
        self
    }

    pub fn with_sentiment(mut self, model: Arc<dyn SentimentModel>) -> Self {
        self.sentiment = Some(model);
        self
    }

    pub fn with_emotion(mut self, model: Arc<dyn EmotionModel>) -> Self {
        self.emotion = Some(model);
        self
    }

    pub fn with_dialogue(mut self, model: Arc<dyn DialogueModel>) -> Self {
        self.dialogue = Some(model);
        self
    }

    pub fn with_summarizer(mut self, model: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(model);
        self
    }

    pub fn speech_to_text(&self) -> Option<&Arc<dyn SpeechToText>> {
        self.speech_to_text.as_ref()
    }

    pub fn sentiment(&self) -> Option<&Arc<dyn SentimentModel>> {
        self.sentiment.as_ref()
    }

    pub fn emotion(&self) -> Option<&Arc<dyn EmotionModel>> {
        self.emotion.as_ref()
    }

    pub fn dialogue(&self) -> Option<&Arc<dyn DialogueModel>> {
        self.dialogue.as_ref()
    }

    pub fn summarizer(&self) -> Option<&Arc<dyn Summarizer>> {
        self.summarizer.as_ref()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("speech_to_text", &self.speech_to_text.as_ref().map(|m| m.name()))
            .field("sentiment", &self.sentiment.is_some())
            .field("emotion", &self.emotion.is_some())
            .field("dialogue", &self.dialogue.is_some())
            .field("summarizer", &self.summarizer.is_some())
            .finish()
    }
}
