//! Metric providers
//!
//! A provider is one algorithm that can compute some catalog metrics. It
//! declares a tier and the metrics it covers; the resolver decides when it
//! runs. Providers report misses as [`ProviderOutcome`] errors and keep
//! per-run intermediate results in the [`ExtractionContext`].

pub mod native_toolkit;
pub mod signal;
pub mod speech_rate;
pub mod toolkit;

use crate::extraction::ExtractionContext;
use crate::types::{ProviderOutcome, Tier};

pub use native_toolkit::{NativeToolkit, UnavailableToolkit};
pub use signal::SignalProvider;
pub use speech_rate::SpeechRateProvider;
pub use toolkit::{
    CapabilityProbe, PitchTrack, PointProcess, ProbeReport, ToolkitError, ToolkitProvider, VoiceToolkit,
};

pub trait MetricProvider: Send + Sync {
    /// Short identifier used in provenance notes
    fn name(&self) -> &'static str;

    fn tier(&self) -> Tier;

    /// Catalog metrics this provider can compute
    fn metrics(&self) -> &'static [&'static str];

    /// Attempt one metric
    fn provide(&self, metric: &str, ctx: &ExtractionContext<'_>) -> ProviderOutcome;
}
