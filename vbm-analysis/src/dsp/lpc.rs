//! Linear prediction formant estimation
//!
//! Autocorrelation LPC (Levinson-Durbin) on pre-emphasized, Hamming-windowed
//! 25 ms frames. Formants are the strongest peaks of the LPC envelope in
//! the F1 and F2 search bands, then the median across frames.

use super::{frame_geometry, frames, median, rms};

/// Search band for the first formant (Hz)
pub const F1_BAND: (f64, f64) = (200.0, 1200.0);
/// Search band for the second formant (Hz)
pub const F2_BAND: (f64, f64) = (600.0, 3500.0);

const PRE_EMPHASIS: f64 = 0.97;
const ENVELOPE_POINTS: usize = 512;
const MIN_FRAME_RMS: f64 = 1e-4;
const MIN_F1_F2_GAP_HZ: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formants {
    pub f1: f64,
    pub f2: f64,
}

/// LPC order for a sample rate: 2 + kHz, at most 16
pub fn lpc_order(sample_rate: u32) -> usize {
    (2 + (sample_rate / 1000) as usize).min(16)
}

/// Prediction polynomial `[1, a1, ..., ap]` by Levinson-Durbin
///
/// Stops early (shorter polynomial) when the prediction error vanishes.
/// Returns `None` for a frame with no energy.
pub fn lpc_coefficients(frame: &[f64], order: usize) -> Option<Vec<f64>> {
    if frame.len() <= order || order == 0 {
        return None;
    }
    let r: Vec<f64> = (0..=order)
        .map(|lag| frame.iter().zip(&frame[lag..]).map(|(a, b)| a * b).sum())
        .collect();
    if r[0] <= 0.0 {
        return None;
    }

    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    let mut error = r[0];
    for i in 1..=order {
        let acc: f64 = (1..i).map(|j| a[j] * r[i - j]).sum();
        let k = -(r[i] + acc) / error;
        if !k.is_finite() || k.abs() >= 1.0 {
            a.truncate(i);
            break;
        }
        let previous = a.clone();
        for j in 1..i {
            a[j] = previous[j] + k * previous[i - j];
        }
        a[i] = k;
        error *= 1.0 - k * k;
        if error <= r[0] * 1e-12 {
            a.truncate(i + 1);
            break;
        }
    }
    Some(a)
}

/// Local maxima of the LPC envelope as `(frequency_hz, level_db)`
pub fn envelope_peaks(coefficients: &[f64], sample_rate: u32) -> Vec<(f64, f64)> {
    let nyquist = sample_rate as f64 / 2.0;
    let levels: Vec<f64> = (0..ENVELOPE_POINTS)
        .map(|i| {
            let w = std::f64::consts::PI * i as f64 / ENVELOPE_POINTS as f64;
            let (mut re, mut im) = (0.0, 0.0);
            for (k, c) in coefficients.iter().enumerate() {
                re += c * (w * k as f64).cos();
                im -= c * (w * k as f64).sin();
            }
            -10.0 * (re * re + im * im).max(1e-20).log10()
        })
        .collect();

    (1..ENVELOPE_POINTS - 1)
        .filter(|&i| levels[i] > levels[i - 1] && levels[i] >= levels[i + 1])
        .map(|i| (nyquist * i as f64 / ENVELOPE_POINTS as f64, levels[i]))
        .collect()
}

/// Median F1/F2 over voiced frames; `None` if no frame yields both
pub fn estimate_formants(samples: &[f32], sample_rate: u32) -> Option<Formants> {
    if sample_rate == 0 {
        return None;
    }
    let (frame_len, hop) = frame_geometry(sample_rate, 0.025, 0.010);
    let order = lpc_order(sample_rate);
    let window = hamming(frame_len);

    let mut f1s = Vec::new();
    let mut f2s = Vec::new();
    for frame in frames(samples, frame_len, hop) {
        if frame.len() < frame_len || rms(frame) < MIN_FRAME_RMS {
            continue;
        }
        let emphasized: Vec<f64> = frame
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let current = super::finite_or_zero(s) as f64;
                let previous = if i > 0 {
                    super::finite_or_zero(frame[i - 1]) as f64
                } else {
                    0.0
                };
                (current - PRE_EMPHASIS * previous) * window[i]
            })
            .collect();

        let Some(coefficients) = lpc_coefficients(&emphasized, order) else {
            continue;
        };
        let peaks = envelope_peaks(&coefficients, sample_rate);
        let Some(f1) = strongest_in(&peaks, F1_BAND.0, F1_BAND.1) else {
            continue;
        };
        let Some(f2) = strongest_in(&peaks, F2_BAND.0.max(f1 + MIN_F1_F2_GAP_HZ), F2_BAND.1) else {
            continue;
        };
        f1s.push(f1);
        f2s.push(f2);
    }

    Some(Formants {
        f1: median(&f1s)?,
        f2: median(&f2s)?,
    })
}

fn strongest_in(peaks: &[(f64, f64)], lo: f64, hi: f64) -> Option<f64> {
    peaks
        .iter()
        .filter(|(f, _)| *f >= lo && *f <= hi)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(f, _)| *f)
}

fn hamming(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}
