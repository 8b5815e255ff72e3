//! Primary tier: voice analysis toolkit
//!
//! [`VoiceToolkit`] is the capability boundary for a formant/perturbation
//! analysis toolkit: pitch tracking, glottal point process, harmonicity and
//! perturbation reads on top of the point process.
//!
//! Whether the toolkit works at all is decided once by [`CapabilityProbe`].
//! When the probe fails, [`ToolkitProvider`] is never registered and no
//! primary pitch/jitter/shimmer/HNR/formant call is attempted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{info, warn};

use super::MetricProvider;
use crate::audio::NormalizedAudio;
use crate::dsp::{self, lpc::Formants};
use crate::extraction::catalog::{self as metric, TOOLKIT_METRICS};
use crate::extraction::ExtractionContext;
use crate::types::{ProviderFailure, ProviderOutcome, Tier};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolkitError {
    #[error("toolkit unavailable: {0}")]
    Unavailable(String),

    #[error("no voiced frames")]
    NoVoicing,

    #[error("too few glottal cycles ({0})")]
    TooFewCycles(usize),

    #[error("{0}")]
    Computation(String),
}

impl From<ToolkitError> for ProviderFailure {
    fn from(e: ToolkitError) -> Self {
        match e {
            ToolkitError::Unavailable(msg) => ProviderFailure::Unavailable(msg),
            ToolkitError::NoVoicing => ProviderFailure::InsufficientSignal("no voiced frames".into()),
            ToolkitError::TooFewCycles(n) => {
                ProviderFailure::InsufficientSignal(format!("{} glottal cycles", n))
            }
            ToolkitError::Computation(msg) => ProviderFailure::Computation(msg),
        }
    }
}

/// Voiced pitch samples over time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchTrack {
    /// Frame center times (seconds), voiced frames only
    pub times: Vec<f64>,
    /// F0 (Hz) of each voiced frame
    pub frequencies: Vec<f64>,
    /// Autocorrelation strength of each voiced frame
    pub strengths: Vec<f64>,
}

impl PitchTrack {
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        dsp::mean(&self.frequencies)
    }

    pub fn std_dev(&self) -> Option<f64> {
        if self.frequencies.len() < 2 {
            return None;
        }
        dsp::std_dev(&self.frequencies)
    }

    /// max − min of voiced F0
    pub fn range(&self) -> Option<f64> {
        if self.frequencies.len() < 2 {
            return None;
        }
        let max = self.frequencies.iter().copied().fold(f64::MIN, f64::max);
        let min = self.frequencies.iter().copied().fold(f64::MAX, f64::min);
        Some(max - min)
    }

    /// F0 of the voiced frame nearest to `time`, if within `tolerance`
    pub fn frequency_at(&self, time: f64, tolerance: f64) -> Option<f64> {
        let idx = self.times.partition_point(|&t| t < time);
        let candidates = [idx.checked_sub(1), Some(idx)];
        candidates
            .iter()
            .flatten()
            .filter_map(|&i| Some((self.times.get(i)?, self.frequencies.get(i)?)))
            .filter(|(t, _)| (**t - time).abs() <= tolerance)
            .min_by(|a, b| (a.0 - time).abs().total_cmp(&(b.0 - time).abs()))
            .map(|(_, f)| *f)
    }
}

/// Glottal pulse times and the peak amplitude of each cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointProcess {
    pub times: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

impl PointProcess {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Formant/perturbation analysis capability
pub trait VoiceToolkit: Send + Sync {
    fn name(&self) -> &'static str;

    fn pitch_track(&self, audio: &NormalizedAudio) -> Result<PitchTrack, ToolkitError>;

    fn point_process(&self, audio: &NormalizedAudio, pitch: &PitchTrack) -> Result<PointProcess, ToolkitError>;

    /// Mean harmonics-to-noise ratio in dB
    fn harmonicity(&self, audio: &NormalizedAudio) -> Result<f64, ToolkitError>;

    /// Percent
    fn jitter_local(&self, points: &PointProcess) -> Result<f64, ToolkitError>;

    /// Percent
    fn jitter_rap(&self, points: &PointProcess) -> Result<f64, ToolkitError>;

    /// Percent
    fn shimmer_local(&self, points: &PointProcess) -> Result<f64, ToolkitError>;

    /// Percent
    fn shimmer_apq11(&self, points: &PointProcess) -> Result<f64, ToolkitError>;

    fn formants(&self, audio: &NormalizedAudio) -> Result<Formants, ToolkitError>;
}

// ============================================================================
// Capability probe
// ============================================================================

/// Outcome of the four canary operations
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub toolkit: &'static str,
    pub available: bool,
    /// `(canary, error)` for each canary that failed
    pub failures: Vec<(&'static str, String)>,
}

/// One-time capability check, cached for the lifetime of the probe
pub struct CapabilityProbe {
    toolkit: Arc<dyn VoiceToolkit>,
    verdict: OnceLock<ProbeReport>,
}

const CANARY_PITCH_HZ: f64 = 150.0;
const CANARY_RATE: u32 = 22_050;
const CANARY_SECONDS: f64 = 0.5;

impl CapabilityProbe {
    pub fn new(toolkit: Arc<dyn VoiceToolkit>) -> Self {
        Self {
            toolkit,
            verdict: OnceLock::new(),
        }
    }

    pub fn toolkit(&self) -> &Arc<dyn VoiceToolkit> {
        &self.toolkit
    }

    /// Run the canaries on first call; later calls return the cached report
    pub fn report(&self) -> &ProbeReport {
        self.verdict.get_or_init(|| {
            let report = run_canaries(self.toolkit.as_ref());
            if report.available {
                info!(toolkit = report.toolkit, "Voice toolkit capability probe passed");
            } else {
                warn!(
                    toolkit = report.toolkit,
                    failures = ?report.failures,
                    "Voice toolkit capability probe failed; primary vocal providers disabled"
                );
            }
            report
        })
    }

    pub fn is_available(&self) -> bool {
        self.report().available
    }
}

fn run_canaries(toolkit: &dyn VoiceToolkit) -> ProbeReport {
    let audio = canary_signal();
    let mut failures = Vec::new();

    let pitch = canary("pitch", &mut failures, || toolkit.pitch_track(&audio).map(Some));
    let points = match &pitch {
        Some(track) => canary("point_process", &mut failures, || {
            toolkit.point_process(&audio, track).map(Some)
        }),
        None => {
            failures.push(("point_process", "skipped: no pitch track".to_string()));
            None
        }
    };
    canary("harmonicity", &mut failures, || toolkit.harmonicity(&audio).map(Some));

    match &points {
        Some(points) => {
            let reads: [(&'static str, Result<f64, ToolkitError>); 4] = [
                ("jitter_local", guarded(|| toolkit.jitter_local(points))),
                ("jitter_rap", guarded(|| toolkit.jitter_rap(points))),
                ("shimmer_local", guarded(|| toolkit.shimmer_local(points))),
                ("shimmer_apq11", guarded(|| toolkit.shimmer_apq11(points))),
            ];
            if !reads.iter().any(|(_, r)| r.is_ok()) {
                let detail = reads
                    .iter()
                    .filter_map(|(n, r)| r.as_ref().err().map(|e| format!("{}: {}", n, e)))
                    .collect::<Vec<_>>()
                    .join("; ");
                failures.push(("perturbation", detail));
            }
        }
        None => failures.push(("perturbation", "skipped: no point process".to_string())),
    }

    ProbeReport {
        toolkit: toolkit.name(),
        available: failures.is_empty(),
        failures,
    }
}

/// Toolkit call with a panic reported as an error
fn guarded<T>(op: impl FnOnce() -> Result<T, ToolkitError>) -> Result<T, ToolkitError> {
    catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|_| Err(ToolkitError::Computation("panicked".to_string())))
}

/// Run one canary, recording its failure
fn canary<T>(
    name: &'static str,
    failures: &mut Vec<(&'static str, String)>,
    op: impl FnOnce() -> Result<Option<T>, ToolkitError>,
) -> Option<T> {
    guarded(op).unwrap_or_else(|e| {
        failures.push((name, e.to_string()));
        None
    })
}

/// 150 Hz harmonic signal with slight cycle-to-cycle variation
fn canary_signal() -> NormalizedAudio {
    let n = (CANARY_RATE as f64 * CANARY_SECONDS) as usize;
    let mut phase = 0.0f64;
    let samples = (0..n)
        .map(|i| {
            let t = i as f64 / CANARY_RATE as f64;
            let f = CANARY_PITCH_HZ * (1.0 + 0.01 * (2.0 * std::f64::consts::PI * 5.0 * t).sin());
            phase += 2.0 * std::f64::consts::PI * f / CANARY_RATE as f64;
            let v: f64 = (1..=5).map(|h| (phase * h as f64).sin() / h as f64).sum();
            (0.3 * v) as f32
        })
        .collect();
    NormalizedAudio::from_samples(samples, CANARY_RATE, "canary")
}

// ============================================================================
// Provider
// ============================================================================

/// Primary-tier provider backed by a probed [`VoiceToolkit`]
pub struct ToolkitProvider {
    toolkit: Arc<dyn VoiceToolkit>,
}

impl ToolkitProvider {
    pub fn new(toolkit: Arc<dyn VoiceToolkit>) -> Self {
        Self { toolkit }
    }

    fn pitch<'c>(&self, ctx: &'c ExtractionContext<'_>) -> Result<&'c PitchTrack, ProviderFailure> {
        ctx.toolkit_pitch
            .get_or_init(|| self.toolkit.pitch_track(ctx.audio()))
            .as_ref()
            .map_err(|e| e.clone().into())
    }

    fn points<'c>(&self, ctx: &'c ExtractionContext<'_>) -> Result<&'c PointProcess, ProviderFailure> {
        ctx.toolkit_points
            .get_or_init(|| {
                let pitch = ctx
                    .toolkit_pitch
                    .get_or_init(|| self.toolkit.pitch_track(ctx.audio()))
                    .clone()?;
                self.toolkit.point_process(ctx.audio(), &pitch)
            })
            .as_ref()
            .map_err(|e| e.clone().into())
    }

    fn formants(&self, ctx: &ExtractionContext<'_>) -> Result<Formants, ProviderFailure> {
        ctx.toolkit_formants
            .get_or_init(|| self.toolkit.formants(ctx.audio()))
            .clone()
            .map_err(Into::into)
    }
}

fn required(value: Option<f64>, what: &str) -> ProviderOutcome {
    value.ok_or_else(|| ProviderFailure::InsufficientSignal(format!("{} needs two voiced frames", what)))
}

impl MetricProvider for ToolkitProvider {
    fn name(&self) -> &'static str {
        "toolkit"
    }

    fn tier(&self) -> Tier {
        Tier::Primary
    }

    fn metrics(&self) -> &'static [&'static str] {
        TOOLKIT_METRICS
    }

    fn provide(&self, name: &str, ctx: &ExtractionContext<'_>) -> ProviderOutcome {
        match name {
            metric::MEAN_PITCH_HZ => required(self.pitch(ctx)?.mean(), "pitch mean"),
            metric::PITCH_STD_HZ => required(self.pitch(ctx)?.std_dev(), "pitch std"),
            metric::PITCH_RANGE_HZ => required(self.pitch(ctx)?.range(), "pitch range"),
            metric::JITTER_LOCAL_PERCENT => Ok(self.toolkit.jitter_local(self.points(ctx)?)?),
            metric::JITTER_RAP_PERCENT => Ok(self.toolkit.jitter_rap(self.points(ctx)?)?),
            metric::SHIMMER_LOCAL_PERCENT => Ok(self.toolkit.shimmer_local(self.points(ctx)?)?),
            metric::SHIMMER_APQ11_PERCENT => Ok(self.toolkit.shimmer_apq11(self.points(ctx)?)?),
            metric::MEAN_HNR_DB => ctx
                .toolkit_hnr
                .get_or_init(|| self.toolkit.harmonicity(ctx.audio()))
                .clone()
                .map_err(Into::into),
            metric::MEAN_F1_HZ => Ok(self.formants(ctx)?.f1),
            metric::MEAN_F2_HZ => Ok(self.formants(ctx)?.f2),
            other => Err(ProviderFailure::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{NativeToolkit, UnavailableToolkit};

    #[test]
    fn test_probe_passes_for_native_toolkit() {
        let probe = CapabilityProbe::new(Arc::new(NativeToolkit::default()));
        let report = probe.report();
        assert!(report.available, "failures: {:?}", report.failures);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_probe_fails_for_unavailable_toolkit() {
        let probe = CapabilityProbe::new(Arc::new(UnavailableToolkit::new("disabled")));
        let report = probe.report();
        assert!(!report.available);
        let names: Vec<&str> = report.failures.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"pitch"));
        assert!(names.contains(&"harmonicity"));
        assert!(names.contains(&"perturbation"));
    }

    /// Native toolkit whose perturbation reads all panic
    struct PanickingPerturbation(NativeToolkit);

    impl VoiceToolkit for PanickingPerturbation {
        fn name(&self) -> &'static str {
            "panicking-perturbation"
        }
        fn pitch_track(&self, audio: &NormalizedAudio) -> Result<PitchTrack, ToolkitError> {
            self.0.pitch_track(audio)
        }
        fn point_process(&self, audio: &NormalizedAudio, pitch: &PitchTrack) -> Result<PointProcess, ToolkitError> {
            self.0.point_process(audio, pitch)
        }
        fn harmonicity(&self, audio: &NormalizedAudio) -> Result<f64, ToolkitError> {
            self.0.harmonicity(audio)
        }
        fn jitter_local(&self, _: &PointProcess) -> Result<f64, ToolkitError> {
            panic!("jitter read crashed")
        }
        fn jitter_rap(&self, _: &PointProcess) -> Result<f64, ToolkitError> {
            panic!("jitter read crashed")
        }
        fn shimmer_local(&self, _: &PointProcess) -> Result<f64, ToolkitError> {
            panic!("shimmer read crashed")
        }
        fn shimmer_apq11(&self, _: &PointProcess) -> Result<f64, ToolkitError> {
            panic!("shimmer read crashed")
        }
        fn formants(&self, audio: &NormalizedAudio) -> Result<Formants, ToolkitError> {
            self.0.formants(audio)
        }
    }

    #[test]
    fn test_panicking_perturbation_reads_fail_the_probe() {
        let probe = CapabilityProbe::new(Arc::new(PanickingPerturbation(NativeToolkit::default())));
        let report = probe.report();
        assert!(!report.available);
        assert_eq!(report.failures.len(), 1, "failures: {:?}", report.failures);
        let (name, detail) = &report.failures[0];
        assert_eq!(*name, "perturbation");
        assert!(detail.contains("jitter_local: panicked"), "{}", detail);

        // Cached: the second call does not run the canaries again
        assert!(std::ptr::eq(report, probe.report()));
    }

    #[test]
    fn test_probe_verdict_is_cached() {
        let probe = CapabilityProbe::new(Arc::new(NativeToolkit::default()));
        let first = probe.report() as *const ProbeReport;
        let second = probe.report() as *const ProbeReport;
        assert_eq!(first, second);
    }

    #[test]
    fn test_pitch_track_statistics() {
        let track = PitchTrack {
            times: vec![0.01, 0.02, 0.03],
            frequencies: vec![100.0, 110.0, 120.0],
            strengths: vec![0.9; 3],
        };
        assert_eq!(track.mean(), Some(110.0));
        assert_eq!(track.range(), Some(20.0));
        assert_eq!(track.frequency_at(0.021, 0.005), Some(110.0));
        assert_eq!(track.frequency_at(0.5, 0.005), None);

        let single = PitchTrack {
            times: vec![0.01],
            frequencies: vec![100.0],
            strengths: vec![0.9],
        };
        assert!(single.range().is_none());
        assert!(single.std_dev().is_none());
    }

    #[test]
    fn test_unsupported_metric() {
        let provider = ToolkitProvider::new(Arc::new(NativeToolkit::default()));
        let audio = NormalizedAudio::from_samples(vec![0.0; 100], 22_050, "a.wav");
        let ctx = ExtractionContext::new("rec", &audio);
        assert!(matches!(
            provider.provide(metric::CHROMA_MEAN, &ctx),
            Err(ProviderFailure::Unsupported(_))
        ));
    }
}
