//! Transcript summarization with an extractive fallback

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use super::models::Summarizer;
use super::segment;
use crate::config::LinguisticSettings;

/// How the summary text was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMethod {
    /// Text too short to summarize; returned unchanged
    Passthrough,
    Model,
    Extractive,
    /// No transcript to summarize
    None,
}

/// Summarize `text`, preferring the model
pub fn summarize(
    text: &str,
    model: Option<&dyn Summarizer>,
    settings: &LinguisticSettings,
) -> (String, SummaryMethod) {
    let text = text.trim();
    if text.chars().count() < settings.summary_min_content_chars {
        return (text.to_string(), SummaryMethod::Passthrough);
    }

    if let Some(model) = model {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            model.summarize(text, settings.summary_max_length, settings.summary_min_length)
        }));
        match outcome {
            Ok(Ok(summary)) if !summary.trim().is_empty() => {
                return (summary.trim().to_string(), SummaryMethod::Model);
            }
            Ok(Ok(_)) => warn!("Summarizer returned empty text; using extractive summary"),
            Ok(Err(e)) => warn!(error = %e, "Summarizer failed; using extractive summary"),
            Err(_) => warn!("Summarizer panicked; using extractive summary"),
        }
    }

    (extractive_summary(text, settings.summary_max_length), SummaryMethod::Extractive)
}

/// First and last sentence when they fit in `max_length` characters,
/// otherwise the text truncated to `max_length - 3` plus `...`
pub fn extractive_summary(text: &str, max_length: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let sentences = segment::sentences(text);
    if let [first, .., last] = sentences.as_slice() {
        let joined = format!("{} {}", first, last);
        if joined.chars().count() <= max_length {
            return joined;
        }
    }

    let keep = max_length.saturating_sub(3);
    let truncated: String = text.chars().take(keep).collect();
    format!("{}...", truncated.trim_end())
}
