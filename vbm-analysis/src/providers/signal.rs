//! Secondary tier: general-purpose signal analysis
//!
//! Frame-level autocorrelation pitch, RMS energy, zero-crossing rate and
//! STFT spectral moments on the normalized buffer. No toolkit required.

use super::MetricProvider;
use crate::dsp::{self, spectral};
use crate::extraction::catalog as metric;
use crate::extraction::ExtractionContext;
use crate::types::{ProviderFailure, ProviderOutcome, Tier};

/// F1 search band on the long-term average spectrum (Hz)
const LTAS_F1_BAND: (f64, f64) = (250.0, 900.0);
/// F2 search band on the long-term average spectrum (Hz)
const LTAS_F2_BAND: (f64, f64) = (900.0, 2500.0);
/// RAP relative to local jitter when only frame pitch is available
const RAP_FROM_LOCAL: f64 = 0.8;

const METRICS: &[&str] = &[
    metric::MEAN_PITCH_HZ,
    metric::PITCH_STD_HZ,
    metric::PITCH_RANGE_HZ,
    metric::INTENSITY_DB,
    metric::JITTER_LOCAL_PERCENT,
    metric::JITTER_RAP_PERCENT,
    metric::SHIMMER_LOCAL_PERCENT,
    metric::SHIMMER_APQ11_PERCENT,
    metric::MEAN_HNR_DB,
    metric::MEAN_F1_HZ,
    metric::MEAN_F2_HZ,
    metric::MFCC_1_MEAN,
    metric::SPECTRAL_CENTROID_MEAN,
    metric::SPECTRAL_BANDWIDTH_MEAN,
    metric::SPECTRAL_CONTRAST_MEAN,
    metric::SPECTRAL_FLATNESS_MEAN,
    metric::SPECTRAL_ROLLOFF_MEAN,
    metric::CHROMA_MEAN,
    metric::ZERO_CROSSING_RATE_MEAN,
    metric::RMS_ENERGY_MEAN,
];

#[derive(Debug, Clone, Default)]
pub struct SignalProvider;

impl SignalProvider {
    pub fn new() -> Self {
        Self
    }

    fn pitches(&self, ctx: &ExtractionContext<'_>, minimum: usize) -> Result<Vec<f64>, ProviderFailure> {
        let frequencies = ctx.frame_analysis().frequencies();
        if frequencies.len() < minimum {
            return Err(ProviderFailure::InsufficientSignal(format!(
                "{} voiced frames, need {}",
                frequencies.len(),
                minimum
            )));
        }
        Ok(frequencies)
    }

    fn jitter_local(&self, ctx: &ExtractionContext<'_>) -> ProviderOutcome {
        let pitches = self.pitches(ctx, 3)?;
        dsp::coefficient_of_variation(&pitches)
            .map(|cv| cv * 100.0)
            .ok_or_else(|| ProviderFailure::Computation("pitch mean is not positive".into()))
    }

    fn shimmer(&self, ctx: &ExtractionContext<'_>, name: &str) -> ProviderOutcome {
        let peaks = &ctx.frame_analysis().voiced_peaks;
        if peaks.len() < 3 {
            return Err(ProviderFailure::InsufficientSignal(format!(
                "{} voiced frames, need 3",
                peaks.len()
            )));
        }
        let mean = dsp::mean(peaks).unwrap_or(0.0);
        if mean <= 0.0 {
            return Err(ProviderFailure::InsufficientSignal("zero frame amplitude".into()));
        }
        let deviations: Vec<f64> = if name == metric::SHIMMER_APQ11_PERCENT {
            (0..peaks.len())
                .map(|i| {
                    let lo = i.saturating_sub(5);
                    let hi = (i + 6).min(peaks.len());
                    let local = dsp::mean(&peaks[lo..hi]).unwrap_or(peaks[i]);
                    (peaks[i] - local).abs()
                })
                .collect()
        } else {
            peaks.windows(2).map(|w| (w[1] - w[0]).abs()).collect()
        };
        Ok(100.0 * dsp::mean(&deviations).unwrap_or(0.0) / mean)
    }

    fn hnr(&self, ctx: &ExtractionContext<'_>) -> ProviderOutcome {
        let strengths: Vec<f64> = ctx.frame_analysis().pitches.iter().map(|p| p.strength).collect();
        let r = dsp::mean(&strengths)
            .ok_or_else(|| ProviderFailure::InsufficientSignal("no voiced frames".into()))?;
        if r <= 0.0 {
            return Err(ProviderFailure::NonPositive(r));
        }
        let r = r.min(1.0 - 1e-6);
        Ok(10.0 * (r / (1.0 - r)).log10())
    }

    fn spectral_summary(&self, ctx: &ExtractionContext<'_>) -> Result<spectral::SpectralSummary, ProviderFailure> {
        ctx.spectrum()
            .and_then(|s| s.summary)
            .ok_or_else(|| ProviderFailure::InsufficientSignal("no spectral energy".into()))
    }

    fn ltas_peak(&self, ctx: &ExtractionContext<'_>, band: (f64, f64)) -> ProviderOutcome {
        let spectrum = ctx
            .spectrum()
            .ok_or_else(|| ProviderFailure::InsufficientSignal("empty buffer".into()))?;
        spectral::peak_frequency(&spectrum.average, spectrum.sample_rate, spectrum.n_fft, band.0, band.1)
            .ok_or_else(|| ProviderFailure::InsufficientSignal("no spectral peak in band".into()))
    }
}

impl MetricProvider for SignalProvider {
    fn name(&self) -> &'static str {
        "signal"
    }

    fn tier(&self) -> Tier {
        Tier::Secondary
    }

    fn metrics(&self) -> &'static [&'static str] {
        METRICS
    }

    fn provide(&self, name: &str, ctx: &ExtractionContext<'_>) -> ProviderOutcome {
        let samples = ctx.samples();
        match name {
            metric::MEAN_PITCH_HZ => {
                let pitches = self.pitches(ctx, 1)?;
                dsp::mean(&pitches).ok_or_else(|| ProviderFailure::InsufficientSignal("no pitch".into()))
            }
            metric::PITCH_STD_HZ => {
                let pitches = self.pitches(ctx, 2)?;
                dsp::std_dev(&pitches).ok_or_else(|| ProviderFailure::InsufficientSignal("no pitch".into()))
            }
            metric::PITCH_RANGE_HZ => {
                let pitches = self.pitches(ctx, 2)?;
                let max = pitches.iter().copied().fold(f64::MIN, f64::max);
                let min = pitches.iter().copied().fold(f64::MAX, f64::min);
                Ok(max - min)
            }
            metric::INTENSITY_DB => dsp::dbfs(dsp::rms(samples))
                .ok_or_else(|| ProviderFailure::InsufficientSignal("silent buffer".into())),
            metric::JITTER_LOCAL_PERCENT => self.jitter_local(ctx),
            metric::JITTER_RAP_PERCENT => Ok(self.jitter_local(ctx)? * RAP_FROM_LOCAL),
            metric::SHIMMER_LOCAL_PERCENT | metric::SHIMMER_APQ11_PERCENT => self.shimmer(ctx, name),
            metric::MEAN_HNR_DB => self.hnr(ctx),
            metric::MEAN_F1_HZ => self.ltas_peak(ctx, LTAS_F1_BAND),
            metric::MEAN_F2_HZ => self.ltas_peak(ctx, LTAS_F2_BAND),
            metric::MFCC_1_MEAN => Ok(self.spectral_summary(ctx)?.mfcc_1),
            metric::SPECTRAL_CENTROID_MEAN => Ok(self.spectral_summary(ctx)?.centroid_hz),
            metric::SPECTRAL_BANDWIDTH_MEAN => Ok(self.spectral_summary(ctx)?.bandwidth_hz),
            metric::SPECTRAL_CONTRAST_MEAN => Ok(self.spectral_summary(ctx)?.contrast_db),
            metric::SPECTRAL_FLATNESS_MEAN => Ok(self.spectral_summary(ctx)?.flatness),
            metric::SPECTRAL_ROLLOFF_MEAN => Ok(self.spectral_summary(ctx)?.rolloff_hz),
            metric::CHROMA_MEAN => Ok(self.spectral_summary(ctx)?.chroma_mean),
            metric::ZERO_CROSSING_RATE_MEAN => dsp::zero_crossing_rate(samples)
                .ok_or_else(|| ProviderFailure::InsufficientSignal("buffer too short".into())),
            metric::RMS_ENERGY_MEAN => {
                if samples.is_empty() {
                    Err(ProviderFailure::InsufficientSignal("empty buffer".into()))
                } else {
                    Ok(dsp::rms(samples))
                }
            }
            other => Err(ProviderFailure::Unsupported(other.to_string())),
        }
    }
}
