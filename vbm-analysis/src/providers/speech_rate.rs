//! Speech and articulation rate from onset detection

use super::MetricProvider;
use crate::extraction::catalog as metric;
use crate::extraction::ExtractionContext;
use crate::types::{ProviderFailure, ProviderOutcome, Tier};

#[derive(Debug, Clone, Default)]
pub struct SpeechRateProvider;

impl SpeechRateProvider {
    pub fn new() -> Self {
        Self
    }
}

impl MetricProvider for SpeechRateProvider {
    fn name(&self) -> &'static str {
        "onsets"
    }

    fn tier(&self) -> Tier {
        Tier::Secondary
    }

    fn metrics(&self) -> &'static [&'static str] {
        &[metric::SPEECH_RATE_SPS, metric::ARTICULATION_RATE_SPS]
    }

    fn provide(&self, name: &str, ctx: &ExtractionContext<'_>) -> ProviderOutcome {
        let timing = ctx
            .speech_timing()
            .ok_or_else(|| ProviderFailure::InsufficientSignal("too short for onset detection".into()))?;
        match name {
            metric::SPEECH_RATE_SPS => Ok(timing.speech_rate()),
            metric::ARTICULATION_RATE_SPS => Ok(timing.articulation_rate()),
            other => Err(ProviderFailure::Unsupported(other.to_string())),
        }
    }
}
