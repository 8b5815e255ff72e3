//! Core types for the cascading feature-extraction engine
//!
//! A metric is computed by trying providers tier by tier. Every attempt
//! yields a [`ProviderOutcome`]; the resolver turns the first acceptable
//! outcome (or a synthesized estimate) into a [`MetricResult`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Tiers
// ============================================================================

/// Provider tier, ordered from most to least trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Dedicated analysis toolkit or model
    Primary,
    /// General-purpose signal analysis or keyword rules
    Secondary,
    /// Buffer statistics or population constants (synthetic)
    Emergency,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::Secondary => "secondary",
            Tier::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Provider outcomes
// ============================================================================

/// Why a provider did not produce a usable value
///
/// These are expected tier misses, recovered by the resolver and never
/// surfaced to callers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderFailure {
    /// Capability or model not present for this run
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Signal does not contain what the algorithm needs (e.g. no voicing)
    #[error("insufficient signal: {0}")]
    InsufficientSignal(String),

    /// Value is NaN or infinite
    #[error("implausible value {0}")]
    Implausible(f64),

    /// Zero or negative value for a strictly positive metric
    #[error("non-positive value {0} for strictly positive metric")]
    NonPositive(f64),

    /// Provider was asked for a metric it does not compute
    #[error("metric not supported: {0}")]
    Unsupported(String),

    /// Algorithm-internal failure
    #[error("computation failed: {0}")]
    Computation(String),
}

/// Outcome of a single provider attempt
pub type ProviderOutcome = Result<f64, ProviderFailure>;

// ============================================================================
// Results
// ============================================================================

/// Final value for one requested metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub tier_used: Tier,
    /// Which provider (or synthesis rule) produced the value, and why
    pub provenance_note: String,
}

impl MetricResult {
    /// True for values synthesized by the emergency branch
    pub fn is_synthetic(&self) -> bool {
        self.tier_used == Tier::Emergency
    }
}

/// All metric results for one run plus a summary of the weakest tier used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub results: Vec<MetricResult>,
    pub method: String,
}

impl ExtractionOutcome {
    pub fn new(results: Vec<MetricResult>) -> Self {
        let method = method_label(results.iter().map(|r| r.tier_used));
        Self { results, method }
    }

    pub fn get(&self, name: &str) -> Option<&MetricResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|r| r.value)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Flat name → value map
    pub fn metric_map(&self) -> BTreeMap<String, f64> {
        self.results
            .iter()
            .map(|r| (r.name.clone(), r.value))
            .collect()
    }

    /// Number of results produced at the given tier
    pub fn count_at(&self, tier: Tier) -> usize {
        self.results.iter().filter(|r| r.tier_used == tier).count()
    }
}

/// Summarize a set of tiers as a method label
///
/// - only primary: `primary`
/// - primary plus anything lower: `primary-with-fallback`
/// - only secondary: `secondary`
/// - secondary plus emergency: `secondary-with-fallback`
/// - only emergency: `emergency-only`
pub fn method_label<I: IntoIterator<Item = Tier>>(tiers: I) -> String {
    let mut primary = false;
    let mut secondary = false;
    let mut emergency = false;
    for tier in tiers {
        match tier {
            Tier::Primary => primary = true,
            Tier::Secondary => secondary = true,
            Tier::Emergency => emergency = true,
        }
    }

    let label = match (primary, secondary, emergency) {
        (false, false, false) => "none",
        (true, false, false) => "primary",
        (true, _, _) => "primary-with-fallback",
        (false, true, false) => "secondary",
        (false, true, true) => "secondary-with-fallback",
        (false, false, true) => "emergency-only",
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, tier: Tier) -> MetricResult {
        MetricResult {
            name: name.to_string(),
            value: 1.0,
            unit: "Hz".to_string(),
            tier_used: tier,
            provenance_note: String::new(),
        }
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Primary < Tier::Secondary);
        assert!(Tier::Secondary < Tier::Emergency);
    }

    #[test]
    fn test_method_label_variants() {
        assert_eq!(method_label([Tier::Primary, Tier::Primary]), "primary");
        assert_eq!(
            method_label([Tier::Primary, Tier::Emergency]),
            "primary-with-fallback"
        );
        assert_eq!(method_label([Tier::Secondary]), "secondary");
        assert_eq!(
            method_label([Tier::Emergency, Tier::Secondary]),
            "secondary-with-fallback"
        );
        assert_eq!(method_label([Tier::Emergency]), "emergency-only");
        assert_eq!(method_label(Vec::<Tier>::new()), "none");
    }

    #[test]
    fn test_outcome_lookup_and_counts() {
        let outcome = ExtractionOutcome::new(vec![
            result("mean_pitch_hz", Tier::Secondary),
            result("mean_hnr_db", Tier::Emergency),
        ]);
        assert_eq!(outcome.method, "secondary-with-fallback");
        assert_eq!(outcome.value("mean_pitch_hz"), Some(1.0));
        assert!(outcome.get("missing").is_none());
        assert_eq!(outcome.count_at(Tier::Emergency), 1);
        assert!(outcome.get("mean_hnr_db").unwrap().is_synthetic());
        assert_eq!(outcome.metric_map().len(), 2);
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        let json = serde_json::to_string(&Tier::Emergency).unwrap();
        assert_eq!(json, "\"emergency\"");
    }
}
