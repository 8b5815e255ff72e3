//! Linguistic extraction pipeline
//!
//! Stages: transcription, sentence segmentation, per-sentence
//! classification (sentiment, emotion, dialogue act), document aggregation
//! and summarization. Each model-backed step falls back to keyword rules or
//! an extractive summary; the pipeline always returns a complete bundle.

pub mod aggregate;
pub mod keywords;
pub mod models;
pub mod segment;
pub mod summary;
pub mod transcriber;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::AudioConverter;
use crate::config::AnalysisSettings;
use crate::types::{method_label, Tier};
use aggregate::{aggregate, SentenceAnalysis};
use models::{DialogueAct, Emotion, ModelError, ModelRegistry, SentimentLabel};
use summary::SummaryMethod;

pub use aggregate::DocumentAggregate;
pub use models::{DialogueModel, EmotionModel, SentimentModel, SpeechToText, Summarizer};

/// Summary text used when there is no transcript to summarize
pub const INSUFFICIENT_TEXT_SUMMARY: &str = "Insufficient text for analysis";

/// Text-level analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub sentences: Vec<SentenceAnalysis>,
    pub sentence_count: usize,
    pub emotions: BTreeMap<String, usize>,
    pub dialogue_acts: BTreeMap<String, usize>,
    pub overall_sentiment: SentimentLabel,
    pub overall_sentiment_score: f64,
    pub dominant_emotion: Emotion,
    pub emotion_confidence: f64,
    pub primary_dialogue_act: DialogueAct,
    pub analysis_method: String,
}

impl DetailedAnalysis {
    fn from_sentences(sentences: Vec<SentenceAnalysis>, analysis_method: String) -> Self {
        let doc = aggregate(&sentences);
        Self {
            sentence_count: sentences.len(),
            sentences,
            emotions: doc.emotions,
            dialogue_acts: doc.dialogue_acts,
            overall_sentiment: doc.overall_sentiment,
            overall_sentiment_score: doc.overall_sentiment_score,
            dominant_emotion: doc.dominant_emotion,
            emotion_confidence: doc.emotion_confidence,
            primary_dialogue_act: doc.primary_dialogue_act,
            analysis_method,
        }
    }

    /// Fixed result for texts too short to classify
    fn short_text() -> Self {
        Self {
            sentences: Vec::new(),
            sentence_count: 0,
            emotions: BTreeMap::from([(Emotion::Neutral.as_str().to_string(), 1)]),
            dialogue_acts: BTreeMap::from([(DialogueAct::Statement.as_str().to_string(), 1)]),
            overall_sentiment: SentimentLabel::Neutral,
            overall_sentiment_score: 0.5,
            dominant_emotion: Emotion::Neutral,
            emotion_confidence: 1.0,
            primary_dialogue_act: DialogueAct::Statement,
            analysis_method: "fallback_short_text".to_string(),
        }
    }
}

/// Which tier or method produced each stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinguisticProvenance {
    /// Speech-to-text provider name, or why there is no transcript
    pub transcription: String,
    pub sentiment: String,
    pub emotion: String,
    pub dialogue_act: String,
    pub summary: SummaryMethod,
}

/// Complete linguistic result for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinguisticBundle {
    pub transcript_text: String,
    pub sentiment_label: SentimentLabel,
    pub sentiment_score: f64,
    pub summary_text: String,
    pub detailed_analysis: DetailedAnalysis,
    pub provenance: LinguisticProvenance,
}

impl LinguisticBundle {
    pub fn sentence_count(&self) -> usize {
        self.detailed_analysis.sentence_count
    }
}

/// Runs a model call, turning a panic into a model failure
fn guarded<T>(call: impl FnOnce() -> Result<T, ModelError>) -> Result<T, ModelError> {
    catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|_| Err(ModelError::Inference("model panicked".to_string())))
}

pub struct LinguisticPipeline {
    registry: Arc<ModelRegistry>,
    converter: AudioConverter,
    settings: AnalysisSettings,
}

impl LinguisticPipeline {
    pub fn new(registry: Arc<ModelRegistry>, settings: AnalysisSettings) -> Self {
        Self {
            registry,
            converter: AudioConverter::new(settings.converter.clone()),
            settings,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Transcribe and analyze a recording; never fails
    pub async fn run(&self, path: &Path) -> LinguisticBundle {
        let (transcript, transcription) = self.transcribe(path).await;
        let bundle = self.analyze_transcript(&transcript, transcription);
        info!(
            path = %path.display(),
            sentences = bundle.sentence_count(),
            sentiment = %bundle.sentiment_label,
            method = %bundle.detailed_analysis.analysis_method,
            "Linguistic extraction complete"
        );
        bundle
    }

    /// Transcript text plus a provenance note; empty text on any failure
    async fn transcribe(&self, path: &Path) -> (String, String) {
        let Some(model) = self.registry.speech_to_text() else {
            return (String::new(), "unavailable".to_string());
        };

        // Held until transcription finishes, dropped on every path below
        let converted = if self.converter.needs_conversion(path) {
            match self
                .converter
                .convert(path, self.settings.transcription_sample_rate)
                .await
            {
                Ok(converted) => Some(converted),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Conversion for transcription failed; using original file");
                    None
                }
            }
        } else {
            None
        };
        let input = converted
            .as_ref()
            .map(|c| c.path())
            .unwrap_or(path)
            .to_path_buf();

        let model = Arc::clone(model);
        let name = model.name();
        let outcome = tokio::spawn(async move { model.transcribe(&input).await }).await;
        drop(converted);

        match outcome {
            Ok(Ok(text)) => {
                debug!(provider = name, chars = text.len(), "Transcription finished");
                (text.trim().to_string(), name.to_string())
            }
            Ok(Err(e)) => {
                warn!(provider = name, error = %e, "Transcription failed");
                (String::new(), format!("{} failed: {}", name, e))
            }
            Err(e) => {
                warn!(provider = name, error = %e, "Transcription task aborted");
                (String::new(), format!("{} aborted", name))
            }
        }
    }

    /// Analyze transcript text; stages 2 to 5
    pub fn analyze_transcript(&self, transcript: &str, transcription: String) -> LinguisticBundle {
        let transcript = transcript.trim();
        let keyword = Tier::Secondary.as_str().to_string();

        if transcript.is_empty() {
            let detailed = DetailedAnalysis::from_sentences(Vec::new(), "insufficient_text".to_string());
            return LinguisticBundle {
                transcript_text: String::new(),
                sentiment_label: detailed.overall_sentiment,
                sentiment_score: detailed.overall_sentiment_score,
                summary_text: INSUFFICIENT_TEXT_SUMMARY.to_string(),
                detailed_analysis: detailed,
                provenance: LinguisticProvenance {
                    transcription,
                    sentiment: "none".to_string(),
                    emotion: "none".to_string(),
                    dialogue_act: "none".to_string(),
                    summary: SummaryMethod::None,
                },
            };
        }

        let linguistic = &self.settings.linguistic;
        let detailed = if transcript.chars().count() < linguistic.min_text_chars {
            DetailedAnalysis::short_text()
        } else {
            let analyses: Vec<SentenceAnalysis> = segment::sentences(transcript)
                .into_iter()
                .filter(|s| s.chars().count() >= linguistic.min_sentence_chars)
                .map(|s| self.classify_sentence(s))
                .collect();
            let method = method_label(analyses.iter().flat_map(|a| a.tiers));
            DetailedAnalysis::from_sentences(analyses, method)
        };

        let stage_label = |stage: usize| {
            if detailed.sentences.is_empty() {
                keyword.clone()
            } else {
                method_label(detailed.sentences.iter().map(|s| s.tiers[stage]))
            }
        };
        let provenance_sentiment = stage_label(0);
        let provenance_emotion = stage_label(1);
        let provenance_dialogue = stage_label(2);

        let summarizer = self.registry.summarizer().map(|m| &**m);
        let (summary_text, summary_method) = summary::summarize(transcript, summarizer, linguistic);

        LinguisticBundle {
            transcript_text: transcript.to_string(),
            sentiment_label: detailed.overall_sentiment,
            sentiment_score: detailed.overall_sentiment_score,
            summary_text,
            detailed_analysis: detailed,
            provenance: LinguisticProvenance {
                transcription,
                sentiment: provenance_sentiment,
                emotion: provenance_emotion,
                dialogue_act: provenance_dialogue,
                summary: summary_method,
            },
        }
    }

    /// Classify one sentence; each sub-analysis picks its tier independently
    fn classify_sentence(&self, text: String) -> SentenceAnalysis {
        let (sentiment, sentiment_score, sentiment_tier) = match self.registry.sentiment() {
            Some(model) => match guarded(|| model.classify(&text)) {
                Ok((label, confidence)) => {
                    let s = confidence.clamp(0.0, 1.0);
                    let score = match label {
                        SentimentLabel::Negative => 0.5 - s / 2.0,
                        _ => 0.5 + s / 2.0,
                    };
                    (label, score, Tier::Primary)
                }
                Err(e) => {
                    debug!(error = %e, "Sentiment model failed; using keywords");
                    let (label, score) = keywords::sentiment(&text);
                    (label, score, Tier::Secondary)
                }
            },
            None => {
                let (label, score) = keywords::sentiment(&text);
                (label, score, Tier::Secondary)
            }
        };

        let (emotion, emotion_tier) = match self.registry.emotion().map(|m| guarded(|| m.classify(&text))) {
            Some(Ok((emotion, _))) => (emotion, Tier::Primary),
            Some(Err(e)) => {
                debug!(error = %e, "Emotion model failed; using keywords");
                (keywords::emotion(&text).0, Tier::Secondary)
            }
            None => (keywords::emotion(&text).0, Tier::Secondary),
        };

        let (dialogue_act, dialogue_tier) = match self.registry.dialogue().map(|m| guarded(|| m.classify(&text))) {
            Some(Ok(act)) => (act, Tier::Primary),
            Some(Err(e)) => {
                debug!(error = %e, "Dialogue model failed; using keywords");
                (keywords::dialogue_act(&text), Tier::Secondary)
            }
            None => (keywords::dialogue_act(&text), Tier::Secondary),
        };

        SentenceAnalysis {
            text,
            sentiment,
            sentiment_score,
            emotion,
            dialogue_act,
            tiers: [sentiment_tier, emotion_tier, dialogue_tier],
        }
    }
}
