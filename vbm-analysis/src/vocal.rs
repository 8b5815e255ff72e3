//! Vocal extraction pipeline
//!
//! Runs every catalog metric through the fallback resolver, then re-checks
//! the required metrics and synthesizes any that are still missing or out
//! of range.

use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::NormalizedAudio;
use crate::config::AnalysisSettings;
use crate::extraction::catalog::{lookup, MetricRequest, MetricSpec, CATALOG, REQUIRED_METRICS};
use crate::extraction::{ExtractionContext, FallbackResolver};
use crate::providers::{
    CapabilityProbe, MetricProvider, NativeToolkit, ProbeReport, SignalProvider, SpeechRateProvider,
    ToolkitProvider, UnavailableToolkit, VoiceToolkit,
};
use crate::types::{ExtractionOutcome, MetricResult, Tier};

pub struct VocalPipeline {
    probe: CapabilityProbe,
    resolver: FallbackResolver,
    catalog: Vec<MetricSpec>,
    fallbacks: Vec<Arc<dyn MetricProvider>>,
}

impl VocalPipeline {
    pub fn new(toolkit: Arc<dyn VoiceToolkit>, settings: &AnalysisSettings) -> Self {
        Self {
            probe: CapabilityProbe::new(toolkit),
            resolver: FallbackResolver::new(settings.emergency_spread),
            catalog: CATALOG.to_vec(),
            fallbacks: vec![
                Arc::new(SignalProvider::new()),
                Arc::new(SpeechRateProvider::new()),
            ],
        }
    }

    /// Native toolkit, or the unavailable one when `toolkit_enabled` is off
    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        let toolkit: Arc<dyn VoiceToolkit> = if settings.toolkit_enabled {
            Arc::new(NativeToolkit::default())
        } else {
            Arc::new(UnavailableToolkit::new("disabled by configuration"))
        };
        Self::new(toolkit, settings)
    }

    /// Restrict the metrics requested per run
    ///
    /// Required metrics left out here are still filled by the completeness
    /// check.
    pub fn with_catalog(mut self, catalog: Vec<MetricSpec>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the secondary providers
    pub fn with_fallbacks(mut self, fallbacks: Vec<Arc<dyn MetricProvider>>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Capability probe verdict (runs the probe on first call)
    pub fn probe(&self) -> &ProbeReport {
        self.probe.report()
    }

    /// Providers for one run; the toolkit provider only when the probe passed
    fn providers(&self) -> Vec<Arc<dyn MetricProvider>> {
        let mut providers: Vec<Arc<dyn MetricProvider>> = Vec::with_capacity(self.fallbacks.len() + 1);
        if self.probe.is_available() {
            providers.push(Arc::new(ToolkitProvider::new(Arc::clone(self.probe.toolkit()))));
        }
        providers.extend(self.fallbacks.iter().cloned());
        providers
    }

    pub fn requests(&self) -> Vec<MetricRequest> {
        let providers = self.providers();
        self.catalog
            .iter()
            .map(|spec| MetricRequest::build(*spec, &providers))
            .collect()
    }

    /// Extract the acoustic catalog for one recording
    pub fn run(&self, recording_id: &str, audio: &NormalizedAudio) -> ExtractionOutcome {
        let ctx = ExtractionContext::new(recording_id, audio);
        let mut results: Vec<MetricResult> = self
            .requests()
            .iter()
            .map(|request| self.resolver.resolve(request, &ctx))
            .collect();

        self.ensure_complete(&mut results, &ctx);

        let outcome = ExtractionOutcome::new(results);
        info!(
            recording_id = recording_id,
            method = %outcome.method,
            metrics = outcome.results.len(),
            primary = outcome.count_at(Tier::Primary),
            secondary = outcome.count_at(Tier::Secondary),
            emergency = outcome.count_at(Tier::Emergency),
            "Vocal extraction complete"
        );
        outcome
    }

    fn ensure_complete(&self, results: &mut Vec<MetricResult>, ctx: &ExtractionContext<'_>) {
        for name in REQUIRED_METRICS {
            let Some(spec) = lookup(name) else {
                continue;
            };
            let position = results.iter().position(|r| r.name == *name);
            let valid = position
                .map(|i| results[i].value.is_finite() && spec.contains(results[i].value))
                .unwrap_or(false);
            if valid {
                continue;
            }
            warn!(metric = name, "Required metric missing after extraction; synthesizing");
            let synthetic = self.resolver.synthesize(spec, ctx);
            match position {
                Some(i) => results[i] = synthetic,
                None => results.push(synthetic),
            }
        }
    }
}
