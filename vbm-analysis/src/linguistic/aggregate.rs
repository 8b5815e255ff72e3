//! Per-sentence results and document-level aggregation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::models::{DialogueAct, Emotion, SentimentLabel};
use crate::types::Tier;

/// Classification of one sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceAnalysis {
    pub text: String,
    pub sentiment: SentimentLabel,
    /// Normalized polarity in `[0, 1]`, 0.5 neutral
    pub sentiment_score: f64,
    pub emotion: Emotion,
    pub dialogue_act: DialogueAct,
    /// Tier used for each sub-analysis: sentiment, emotion, dialogue act
    pub tiers: [Tier; 3],
}

/// Document-level view of the sentence analyses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAggregate {
    pub overall_sentiment: SentimentLabel,
    pub overall_sentiment_score: f64,
    pub dominant_emotion: Emotion,
    /// Dominant emotion count over classified sentences (0 when none)
    pub emotion_confidence: f64,
    pub primary_dialogue_act: DialogueAct,
    pub emotions: BTreeMap<String, usize>,
    pub dialogue_acts: BTreeMap<String, usize>,
}

/// Label counts in first-seen order
struct Tally<T> {
    counts: Vec<(T, usize)>,
}

impl<T: PartialEq + Copy> Tally<T> {
    fn new() -> Self {
        Self { counts: Vec::new() }
    }

    fn add(&mut self, label: T) {
        match self.counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((label, 1)),
        }
    }

    /// Most frequent label; ties go to the one seen first
    fn argmax(&self) -> Option<(T, usize)> {
        let mut best: Option<(T, usize)> = None;
        for &(label, count) in &self.counts {
            if best.map(|(_, n)| count > n).unwrap_or(true) {
                best = Some((label, count));
            }
        }
        best
    }

    fn to_map(&self, name: impl Fn(&T) -> &'static str) -> BTreeMap<String, usize> {
        self.counts
            .iter()
            .map(|(label, count)| (name(label).to_string(), *count))
            .collect()
    }
}

/// Aggregate sentence analyses into document labels
///
/// Defined for any input length: no sentences gives neutral sentiment at
/// 0.5, `neutral` emotion and `statement` dialogue act.
pub fn aggregate(sentences: &[SentenceAnalysis]) -> DocumentAggregate {
    let mut emotions = Tally::new();
    let mut acts = Tally::new();
    for sentence in sentences {
        emotions.add(sentence.emotion);
        acts.add(sentence.dialogue_act);
    }

    let overall_sentiment_score = if sentences.is_empty() {
        0.5
    } else {
        sentences.iter().map(|s| s.sentiment_score).sum::<f64>() / sentences.len() as f64
    };

    let (dominant_emotion, emotion_confidence) = match emotions.argmax() {
        Some((emotion, count)) => (emotion, count as f64 / sentences.len() as f64),
        None => (Emotion::Neutral, 0.0),
    };

    DocumentAggregate {
        overall_sentiment: SentimentLabel::from_score(overall_sentiment_score),
        overall_sentiment_score,
        dominant_emotion,
        emotion_confidence,
        primary_dialogue_act: acts.argmax().map(|(act, _)| act).unwrap_or(DialogueAct::Statement),
        emotions: emotions.to_map(Emotion::as_str),
        dialogue_acts: acts.to_map(DialogueAct::as_str),
    }
}
