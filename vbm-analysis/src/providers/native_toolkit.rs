//! Built-in voice toolkits
//!
//! [`NativeToolkit`] is a cycle-level analyser: an autocorrelation pitch
//! track, a glottal point process found by peak picking one period at a
//! time, and period/amplitude perturbation measured on that point process.
//! [`UnavailableToolkit`] stands in when the toolkit is switched off.

use super::toolkit::{PitchTrack, PointProcess, ToolkitError, VoiceToolkit};
use crate::audio::NormalizedAudio;
use crate::dsp::{self, lpc};

/// Longest accepted ratio between adjacent periods
const MAX_PERIOD_FACTOR: f64 = 1.3;
/// How far a pulse may sit from the nearest voiced pitch frame (seconds)
const PITCH_TOLERANCE_SECONDS: f64 = 0.02;
const APQ11_HALF_WINDOW: usize = 5;

#[derive(Debug, Clone)]
pub struct NativeToolkit {
    floor_hz: f64,
    ceiling_hz: f64,
    frame_seconds: f64,
    hop_seconds: f64,
}

impl Default for NativeToolkit {
    fn default() -> Self {
        Self {
            floor_hz: dsp::PITCH_FLOOR_HZ,
            ceiling_hz: dsp::PITCH_CEILING_HZ,
            frame_seconds: 0.04,
            hop_seconds: 0.01,
        }
    }
}

impl NativeToolkit {
    fn analyse_frames(&self, audio: &NormalizedAudio) -> PitchTrack {
        let sr = audio.sample_rate;
        let mut track = PitchTrack::default();
        if sr == 0 {
            return track;
        }
        let (frame_len, hop) = dsp::frame_geometry(sr, self.frame_seconds, self.hop_seconds);
        for (index, frame) in dsp::frames(&audio.samples, frame_len, hop).into_iter().enumerate() {
            if let Some(pitch) = dsp::autocorrelation_pitch(frame, sr, self.floor_hz, self.ceiling_hz) {
                track.times.push((index * hop + frame_len / 2) as f64 / sr as f64);
                track.frequencies.push(pitch.frequency);
                track.strengths.push(pitch.strength);
            }
        }
        track
    }

    /// Pulse periods, with `false` for periods that span an unvoiced gap
    fn periods(&self, points: &PointProcess) -> Vec<(f64, bool)> {
        let min_period = 1.0 / self.ceiling_hz;
        let max_period = 1.0 / self.floor_hz;
        let raw: Vec<f64> = points.times.windows(2).map(|w| w[1] - w[0]).collect();
        raw.iter()
            .enumerate()
            .map(|(i, &p)| {
                let in_range = p >= min_period && p <= max_period;
                let consistent = i == 0 || {
                    let prev = raw[i - 1];
                    prev > 0.0 && (p / prev).max(prev / p) <= MAX_PERIOD_FACTOR
                };
                (p, in_range && consistent)
            })
            .collect()
    }
}

/// Five-point running median over voiced frames to remove octave spikes
fn median_smooth(values: &[f64]) -> Vec<f64> {
    if values.len() < 5 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(2);
            let hi = (i + 3).min(values.len());
            dsp::median(&values[lo..hi]).unwrap_or(values[i])
        })
        .collect()
}

fn argmax(samples: &[f32]) -> Option<usize> {
    samples
        .iter()
        .enumerate()
        .max_by(|a, b| dsp::finite_or_zero(*a.1).total_cmp(&dsp::finite_or_zero(*b.1)))
        .map(|(i, _)| i)
}

/// Sub-sample peak position by parabolic interpolation
fn refine_peak(samples: &[f32], index: usize) -> f64 {
    if index == 0 || index + 1 >= samples.len() {
        return index as f64;
    }
    let (a, b, c) = (
        samples[index - 1] as f64,
        samples[index] as f64,
        samples[index + 1] as f64,
    );
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-12 {
        return index as f64;
    }
    index as f64 + (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
}

impl VoiceToolkit for NativeToolkit {
    fn name(&self) -> &'static str {
        "native"
    }

    fn pitch_track(&self, audio: &NormalizedAudio) -> Result<PitchTrack, ToolkitError> {
        let mut track = self.analyse_frames(audio);
        if track.is_empty() {
            return Err(ToolkitError::NoVoicing);
        }
        track.frequencies = median_smooth(&track.frequencies);
        Ok(track)
    }

    fn point_process(&self, audio: &NormalizedAudio, pitch: &PitchTrack) -> Result<PointProcess, ToolkitError> {
        if pitch.is_empty() {
            return Err(ToolkitError::NoVoicing);
        }
        let x = &audio.samples;
        let sr = audio.sample_rate as f64;
        let n = x.len();
        let step = ((sr * self.hop_seconds) as usize).max(1);

        let mut points = PointProcess::default();
        let mut i = 0usize;
        let mut previous: Option<usize> = None;
        while i < n {
            let Some(f0) = pitch.frequency_at(i as f64 / sr, PITCH_TOLERANCE_SECONDS) else {
                previous = None;
                i += step;
                continue;
            };
            let period = sr / f0;
            let (lo, hi) = match previous {
                None => (i, (i + period.ceil() as usize).min(n)),
                Some(p) => (
                    p + (0.8 * period) as usize,
                    (p + (1.2 * period).ceil() as usize).min(n),
                ),
            };
            if lo >= hi {
                break;
            }
            let Some(offset) = argmax(&x[lo..hi]) else {
                break;
            };
            let peak = lo + offset;
            points.times.push(refine_peak(x, peak) / sr);
            points.amplitudes.push(dsp::finite_or_zero(x[peak]).abs() as f64);
            previous = Some(peak);
            i = peak + 1;
        }

        if points.len() < 3 {
            return Err(ToolkitError::TooFewCycles(points.len()));
        }
        Ok(points)
    }

    fn harmonicity(&self, audio: &NormalizedAudio) -> Result<f64, ToolkitError> {
        let track = self.analyse_frames(audio);
        let values: Vec<f64> = track
            .strengths
            .iter()
            .map(|&r| {
                let r = r.clamp(1e-6, 1.0 - 1e-6);
                10.0 * (r / (1.0 - r)).log10()
            })
            .collect();
        dsp::mean(&values).ok_or(ToolkitError::NoVoicing)
    }

    fn jitter_local(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        let periods = self.periods(points);
        let mut diffs = Vec::new();
        let mut used = Vec::new();
        for w in periods.windows(2) {
            if w[0].1 && w[1].1 {
                diffs.push((w[1].0 - w[0].0).abs());
            }
        }
        for &(p, valid) in &periods {
            if valid {
                used.push(p);
            }
        }
        if diffs.is_empty() {
            return Err(ToolkitError::TooFewCycles(used.len()));
        }
        let mean_period = dsp::mean(&used).ok_or(ToolkitError::NoVoicing)?;
        let mean_diff = dsp::mean(&diffs).ok_or(ToolkitError::NoVoicing)?;
        Ok(100.0 * mean_diff / mean_period)
    }

    fn jitter_rap(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        let periods = self.periods(points);
        let mut deviations = Vec::new();
        for w in periods.windows(3) {
            if w.iter().all(|(_, valid)| *valid) {
                let average = (w[0].0 + w[1].0 + w[2].0) / 3.0;
                deviations.push((w[1].0 - average).abs());
            }
        }
        if deviations.is_empty() {
            return Err(ToolkitError::TooFewCycles(periods.len()));
        }
        let valid: Vec<f64> = periods.iter().filter(|(_, v)| *v).map(|(p, _)| *p).collect();
        let mean_period = dsp::mean(&valid).ok_or(ToolkitError::NoVoicing)?;
        Ok(100.0 * dsp::mean(&deviations).unwrap_or(0.0) / mean_period)
    }

    fn shimmer_local(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        let periods = self.periods(points);
        let amplitudes = &points.amplitudes;
        let diffs: Vec<f64> = periods
            .iter()
            .enumerate()
            .filter(|(_, (_, valid))| *valid)
            .map(|(i, _)| (amplitudes[i + 1] - amplitudes[i]).abs())
            .collect();
        if diffs.is_empty() {
            return Err(ToolkitError::TooFewCycles(amplitudes.len()));
        }
        let mean_amplitude = dsp::mean(amplitudes).ok_or(ToolkitError::NoVoicing)?;
        if mean_amplitude <= 0.0 {
            return Err(ToolkitError::Computation("zero cycle amplitude".into()));
        }
        Ok(100.0 * dsp::mean(&diffs).unwrap_or(0.0) / mean_amplitude)
    }

    fn shimmer_apq11(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        let a = &points.amplitudes;
        let window = 2 * APQ11_HALF_WINDOW + 1;
        if a.len() < window {
            return Err(ToolkitError::TooFewCycles(a.len()));
        }
        let deviations: Vec<f64> = (APQ11_HALF_WINDOW..a.len() - APQ11_HALF_WINDOW)
            .map(|i| {
                let neighbourhood = &a[i - APQ11_HALF_WINDOW..=i + APQ11_HALF_WINDOW];
                let average = neighbourhood.iter().sum::<f64>() / window as f64;
                (a[i] - average).abs()
            })
            .collect();
        let mean_amplitude = dsp::mean(a).ok_or(ToolkitError::NoVoicing)?;
        if mean_amplitude <= 0.0 {
            return Err(ToolkitError::Computation("zero cycle amplitude".into()));
        }
        Ok(100.0 * dsp::mean(&deviations).unwrap_or(0.0) / mean_amplitude)
    }

    fn formants(&self, audio: &NormalizedAudio) -> Result<lpc::Formants, ToolkitError> {
        lpc::estimate_formants(&audio.samples, audio.sample_rate)
            .ok_or_else(|| ToolkitError::Computation("no stable LPC formant peaks".into()))
    }
}

/// Toolkit that reports every operation as unavailable
#[derive(Debug, Clone)]
pub struct UnavailableToolkit {
    reason: String,
}

impl UnavailableToolkit {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn err<T>(&self) -> Result<T, ToolkitError> {
        Err(ToolkitError::Unavailable(self.reason.clone()))
    }
}

impl VoiceToolkit for UnavailableToolkit {
    fn name(&self) -> &'static str {
        "unavailable"
    }
    fn pitch_track(&self, _audio: &NormalizedAudio) -> Result<PitchTrack, ToolkitError> {
        self.err()
    }
    fn point_process(&self, _audio: &NormalizedAudio, _pitch: &PitchTrack) -> Result<PointProcess, ToolkitError> {
        self.err()
    }
    fn harmonicity(&self, _audio: &NormalizedAudio) -> Result<f64, ToolkitError> {
        self.err()
    }
    fn jitter_local(&self, _points: &PointProcess) -> Result<f64, ToolkitError> {
        self.err()
    }
    fn jitter_rap(&self, _points: &PointProcess) -> Result<f64, ToolkitError> {
        self.err()
    }
    fn shimmer_local(&self, _points: &PointProcess) -> Result<f64, ToolkitError> {
        self.err()
    }
    fn shimmer_apq11(&self, _points: &PointProcess) -> Result<f64, ToolkitError> {
        self.err()
    }
    fn formants(&self, _audio: &NormalizedAudio) -> Result<lpc::Formants, ToolkitError> {
        self.err()
    }
}
