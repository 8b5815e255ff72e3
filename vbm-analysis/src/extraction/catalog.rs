//! Acoustic metric catalog
//!
//! One declarative entry per metric: unit, valid range, whether zero is a
//! physically meaningful value, the population-typical constant and the
//! buffer statistic used when every provider misses. Adding a metric is a
//! table change.

use std::sync::Arc;

use crate::audio::NormalizedAudio;
use crate::dsp;
use crate::providers::MetricProvider;

/// Buffer statistic the emergency branch derives a value from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmergencyStatistic {
    /// Constant only
    None,
    /// `offset + scale · RMS`
    ScaledRms { offset: f64, scale: f64 },
    /// `20 · log10(RMS)`
    Dbfs,
    /// Amplitude-envelope coefficient of variation times `scale`, only for
    /// buffers longer than `min_samples`
    AmplitudeCv { scale: f64, min_samples: usize },
    ZeroCrossingRate,
    Rms,
}

impl EmergencyStatistic {
    /// Evaluate on a buffer; `None` when not definable for it
    pub fn evaluate(&self, audio: &NormalizedAudio) -> Option<f64> {
        let samples = &audio.samples;
        if samples.is_empty() {
            return None;
        }
        let value = match *self {
            EmergencyStatistic::None => return None,
            EmergencyStatistic::ScaledRms { offset, scale } => offset + scale * dsp::rms(samples),
            EmergencyStatistic::Dbfs => dsp::dbfs(dsp::rms(samples))?,
            EmergencyStatistic::AmplitudeCv { scale, min_samples } => {
                if samples.len() <= min_samples {
                    return None;
                }
                dsp::amplitude_cv(samples)? * scale
            }
            EmergencyStatistic::ZeroCrossingRate => dsp::zero_crossing_rate(samples)?,
            EmergencyStatistic::Rms => dsp::rms(samples),
        };
        value.is_finite().then_some(value)
    }

    pub fn label(&self) -> &'static str {
        match self {
            EmergencyStatistic::None => "constant",
            EmergencyStatistic::ScaledRms { .. } => "rms-scaled estimate",
            EmergencyStatistic::Dbfs => "buffer dBFS",
            EmergencyStatistic::AmplitudeCv { .. } => "amplitude-cv estimate",
            EmergencyStatistic::ZeroCrossingRate => "buffer zero-crossing rate",
            EmergencyStatistic::Rms => "buffer rms",
        }
    }
}

/// Static description of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub lo: f64,
    pub hi: f64,
    /// Zero or negative values are provider failures, not measurements
    pub strictly_positive: bool,
    /// Population-typical value
    pub constant: f64,
    pub statistic: EmergencyStatistic,
}

impl MetricSpec {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }
}

pub const MEAN_PITCH_HZ: &str = "mean_pitch_hz";
pub const PITCH_STD_HZ: &str = "pitch_std_hz";
pub const PITCH_RANGE_HZ: &str = "pitch_range_hz";
pub const INTENSITY_DB: &str = "intensity_db";
pub const JITTER_LOCAL_PERCENT: &str = "jitter_local_percent";
pub const JITTER_RAP_PERCENT: &str = "jitter_rap_percent";
pub const SHIMMER_LOCAL_PERCENT: &str = "shimmer_local_percent";
pub const SHIMMER_APQ11_PERCENT: &str = "shimmer_apq11_percent";
pub const MEAN_HNR_DB: &str = "mean_hnr_db";
pub const MEAN_F1_HZ: &str = "mean_f1_hz";
pub const MEAN_F2_HZ: &str = "mean_f2_hz";
pub const MFCC_1_MEAN: &str = "mfcc_1_mean";
pub const SPECTRAL_CENTROID_MEAN: &str = "spectral_centroid_mean";
pub const SPECTRAL_BANDWIDTH_MEAN: &str = "spectral_bandwidth_mean";
pub const SPECTRAL_CONTRAST_MEAN: &str = "spectral_contrast_mean";
pub const SPECTRAL_FLATNESS_MEAN: &str = "spectral_flatness_mean";
pub const SPECTRAL_ROLLOFF_MEAN: &str = "spectral_rolloff_mean";
pub const CHROMA_MEAN: &str = "chroma_mean";
pub const ZERO_CROSSING_RATE_MEAN: &str = "zero_crossing_rate_mean";
pub const RMS_ENERGY_MEAN: &str = "rms_energy_mean";
pub const SPEECH_RATE_SPS: &str = "speech_rate_sps";
pub const ARTICULATION_RATE_SPS: &str = "articulation_rate_sps";

const fn spec(
    name: &'static str,
    unit: &'static str,
    lo: f64,
    hi: f64,
    strictly_positive: bool,
    constant: f64,
    statistic: EmergencyStatistic,
) -> MetricSpec {
    MetricSpec {
        name,
        unit,
        lo,
        hi,
        strictly_positive,
        constant,
        statistic,
    }
}

use EmergencyStatistic as S;

/// Full acoustic catalog in output order
pub static CATALOG: &[MetricSpec] = &[
    spec(MEAN_PITCH_HZ, "Hz", 80.0, 400.0, true, 150.0, S::ScaledRms { offset: 120.0, scale: 200.0 }),
    spec(PITCH_STD_HZ, "Hz", 0.0, 150.0, false, 25.0, S::None),
    spec(PITCH_RANGE_HZ, "Hz", 20.0, 800.0, true, 80.0, S::None),
    spec(INTENSITY_DB, "dB", -60.0, 0.0, false, -30.0, S::Dbfs),
    spec(JITTER_LOCAL_PERCENT, "%", 0.05, 15.0, true, 2.5, S::ScaledRms { offset: 0.5, scale: 8.0 }),
    spec(JITTER_RAP_PERCENT, "%", 0.05, 12.0, true, 1.2, S::None),
    spec(SHIMMER_LOCAL_PERCENT, "%", 0.1, 20.0, true, 3.2, S::AmplitudeCv { scale: 100.0, min_samples: 1000 }),
    spec(SHIMMER_APQ11_PERCENT, "%", 0.1, 20.0, true, 3.8, S::AmplitudeCv { scale: 120.0, min_samples: 1000 }),
    spec(MEAN_HNR_DB, "dB", 3.0, 35.0, true, 18.5, S::ScaledRms { offset: 15.0, scale: 20.0 }),
    spec(MEAN_F1_HZ, "Hz", 200.0, 1200.0, true, 500.0, S::None),
    spec(MEAN_F2_HZ, "Hz", 600.0, 3500.0, true, 1500.0, S::None),
    spec(MFCC_1_MEAN, "", -1000.0, 1000.0, false, 0.0, S::None),
    spec(SPECTRAL_CENTROID_MEAN, "Hz", 100.0, 8000.0, true, 2000.0, S::None),
    spec(SPECTRAL_BANDWIDTH_MEAN, "Hz", 50.0, 6000.0, true, 1000.0, S::None),
    spec(SPECTRAL_CONTRAST_MEAN, "dB", 0.0, 80.0, false, 20.0, S::None),
    spec(SPECTRAL_FLATNESS_MEAN, "", 0.0, 1.0, false, 0.3, S::None),
    spec(SPECTRAL_ROLLOFF_MEAN, "Hz", 100.0, 11025.0, true, 3000.0, S::None),
    spec(CHROMA_MEAN, "", 0.0, 1.0, false, 0.5, S::None),
    spec(ZERO_CROSSING_RATE_MEAN, "", 0.0, 1.0, false, 0.1, S::ZeroCrossingRate),
    spec(RMS_ENERGY_MEAN, "", 0.0, 1.0, false, 0.1, S::Rms),
    spec(SPEECH_RATE_SPS, "syll/s", 0.0, 12.0, false, 4.0, S::None),
    spec(ARTICULATION_RATE_SPS, "syll/s", 0.0, 15.0, false, 4.5, S::None),
];

/// Metrics re-checked after every run; anything missing is synthesized
pub const REQUIRED_METRICS: &[&str] = &[
    MEAN_PITCH_HZ,
    JITTER_LOCAL_PERCENT,
    SHIMMER_LOCAL_PERCENT,
    PITCH_RANGE_HZ,
    MEAN_HNR_DB,
    MFCC_1_MEAN,
];

/// Metrics the primary toolkit is the preferred source for
pub const TOOLKIT_METRICS: &[&str] = &[
    MEAN_PITCH_HZ,
    PITCH_STD_HZ,
    PITCH_RANGE_HZ,
    JITTER_LOCAL_PERCENT,
    JITTER_RAP_PERCENT,
    SHIMMER_LOCAL_PERCENT,
    SHIMMER_APQ11_PERCENT,
    MEAN_HNR_DB,
    MEAN_F1_HZ,
    MEAN_F2_HZ,
];

pub fn lookup(name: &str) -> Option<&'static MetricSpec> {
    CATALOG.iter().find(|s| s.name == name)
}

/// One metric plus its candidate providers in tier order
#[derive(Clone)]
pub struct MetricRequest {
    pub spec: MetricSpec,
    pub providers: Vec<Arc<dyn MetricProvider>>,
}

impl MetricRequest {
    /// Select every provider declaring this metric, ordered by tier
    ///
    /// The sort is stable, so registration order breaks ties within a tier.
    pub fn build(spec: MetricSpec, available: &[Arc<dyn MetricProvider>]) -> Self {
        let mut providers: Vec<Arc<dyn MetricProvider>> = available
            .iter()
            .filter(|p| p.metrics().contains(&spec.name))
            .cloned()
            .collect();
        providers.sort_by_key(|p| p.tier());
        Self { spec, providers }
    }
}

impl std::fmt::Debug for MetricRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRequest")
            .field("metric", &self.spec.name)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
