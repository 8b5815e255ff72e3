//! Rule-based weekly summary over completed analyses
//!
//! Synthetic (emergency-tier) metric values are left out of every average.

use std::collections::BTreeMap;

use crate::dsp::{mean, std_dev};
use crate::extraction::catalog::{JITTER_LOCAL_PERCENT, MEAN_PITCH_HZ};
use crate::linguistic::models::SentimentLabel;
use crate::models::AnalysisResults;

/// Pitch standard deviation below this is reported as stable
const STABLE_PITCH_STD_HZ: f64 = 20.0;
/// Mean local jitter below this is reported as normal
const NORMAL_JITTER_PERCENT: f64 = 2.0;
/// Analyses needed before trends are considered meaningful
const SUFFICIENT_ANALYSES: usize = 3;

fn measured(results: &[AnalysisResults], metric: &str) -> Vec<f64> {
    results
        .iter()
        .filter_map(|r| r.vocal.as_ref()?.get(metric))
        .filter(|m| !m.is_synthetic())
        .map(|m| m.value)
        .collect()
}

/// Highest count; ties go to the alphabetically first label
fn dominant(totals: &BTreeMap<String, usize>) -> Option<(&str, usize)> {
    let mut best: Option<(&str, usize)> = None;
    for (label, &count) in totals {
        if best.map(|(_, n)| count > n).unwrap_or(true) {
            best = Some((label.as_str(), count));
        }
    }
    best
}

pub fn weekly_summary(results: &[AnalysisResults]) -> String {
    if results.is_empty() {
        return "No analysis data available for weekly summary.".to_string();
    }

    let mut parts = vec![format!("Weekly Summary: Analyzed {} recordings.", results.len())];

    let pitch = measured(results, MEAN_PITCH_HZ);
    if let (Some(avg), Some(std)) = (mean(&pitch), std_dev(&pitch)) {
        let trend = if std < STABLE_PITCH_STD_HZ { "stable" } else { "variable" };
        parts.push(format!("Average pitch: {:.1}Hz ({}).", avg, trend));
    }

    let jitter = measured(results, JITTER_LOCAL_PERCENT);
    if let Some(avg) = mean(&jitter) {
        let status = if avg < NORMAL_JITTER_PERCENT { "normal" } else { "elevated" };
        parts.push(format!("Average jitter: {:.2}% ({}).", avg, status));
    }

    let bundles: Vec<_> = results
        .iter()
        .filter_map(|r| r.linguistic.as_ref())
        .filter(|b| !b.transcript_text.is_empty())
        .collect();

    let sentiment: Vec<f64> = bundles.iter().map(|b| b.sentiment_score).collect();
    if let Some(avg) = mean(&sentiment) {
        let state = match SentimentLabel::from_score(avg) {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        };
        parts.push(format!("Emotional state: {} (score: {:.2}).", state, avg));
    }

    let mut emotions: BTreeMap<String, usize> = BTreeMap::new();
    let mut acts: BTreeMap<String, usize> = BTreeMap::new();
    for bundle in &bundles {
        for (label, count) in &bundle.detailed_analysis.emotions {
            *emotions.entry(label.clone()).or_default() += count;
        }
        for (label, count) in &bundle.detailed_analysis.dialogue_acts {
            *acts.entry(label.clone()).or_default() += count;
        }
    }
    if let Some((emotion, count)) = dominant(&emotions) {
        parts.push(format!("Dominant emotion pattern: {} ({} occurrences).", emotion, count));
    }
    if let Some((act, count)) = dominant(&acts) {
        parts.push(format!("Primary communication style: {} ({} instances).", act, count));
    }

    if results.len() >= SUFFICIENT_ANALYSES {
        parts.push("Sufficient data for comprehensive trend analysis.".to_string());
    } else {
        parts.push("Limited data for comprehensive analysis.".to_string());
    }

    parts.join(" ")
}
