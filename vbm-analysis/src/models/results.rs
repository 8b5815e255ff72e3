//! Merged output of both pipelines for one job

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::linguistic::{LinguisticBundle, LinguisticProvenance};
use crate::types::{ExtractionOutcome, Tier};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    /// None when the recording could not be loaded for vocal analysis
    pub vocal: Option<ExtractionOutcome>,
    pub linguistic: Option<LinguisticBundle>,
}

/// Where one metric value came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricProvenance {
    pub tier_used: Tier,
    pub note: String,
}

/// Per-field provenance stored next to the results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsProvenance {
    pub vocal_method: Option<String>,
    pub metrics: BTreeMap<String, MetricProvenance>,
    pub linguistic: Option<LinguisticProvenance>,
}

impl AnalysisResults {
    /// Flat field map: every vocal metric plus the legacy linguistic fields
    ///
    /// Linguistic fields are only present when a transcript was produced.
    pub fn field_map(&self) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        if let Some(vocal) = &self.vocal {
            for result in &vocal.results {
                fields.insert(result.name.clone(), json!(result.value));
            }
        }
        if let Some(bundle) = self.linguistic.as_ref().filter(|b| !b.transcript_text.is_empty()) {
            fields.insert("transcript_text".to_string(), json!(bundle.transcript_text));
            fields.insert("sentiment_label".to_string(), json!(bundle.sentiment_label));
            fields.insert("sentiment_score".to_string(), json!(bundle.sentiment_score));
            fields.insert("summary_text".to_string(), json!(bundle.summary_text));
            fields.insert(
                "dominant_emotion".to_string(),
                json!(bundle.detailed_analysis.dominant_emotion),
            );
            fields.insert(
                "primary_dialogue_act".to_string(),
                json!(bundle.detailed_analysis.primary_dialogue_act),
            );
        }
        fields
    }

    /// True when neither pipeline produced a single field
    pub fn is_empty(&self) -> bool {
        self.field_map().is_empty()
    }

    pub fn provenance(&self) -> ResultsProvenance {
        ResultsProvenance {
            vocal_method: self.vocal.as_ref().map(|v| v.method.clone()),
            metrics: self
                .vocal
                .iter()
                .flat_map(|v| &v.results)
                .map(|r| {
                    (
                        r.name.clone(),
                        MetricProvenance {
                            tier_used: r.tier_used,
                            note: r.provenance_note.clone(),
                        },
                    )
                })
                .collect(),
            linguistic: self.linguistic.as_ref().map(|b| b.provenance.clone()),
        }
    }
}
