//! Signal processing primitives shared by the providers
//!
//! Everything here is pure arithmetic on mono `f32` buffers. Functions
//! return `Option` when the input cannot support the measurement
//! (empty, silent, too short) instead of producing NaN.

pub mod lpc;
pub mod onset;
pub mod spectral;

/// Lowest fundamental frequency searched for (Hz)
pub const PITCH_FLOOR_HZ: f64 = 75.0;
/// Highest fundamental frequency searched for (Hz)
pub const PITCH_CEILING_HZ: f64 = 500.0;
/// Normalized autocorrelation a frame needs to count as voiced
pub const VOICING_THRESHOLD: f64 = 0.45;

const SILENCE_RMS: f64 = 1e-5;

// ============================================================================
// Statistics
// ============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// std / mean; `None` when the mean is not positive
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m <= 0.0 || !m.is_finite() {
        return None;
    }
    Some(std_dev(values)? / m)
}

/// Median of finite values
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

// ============================================================================
// Time-domain measures
// ============================================================================

/// Root mean square of the buffer (0.0 for empty input)
///
/// Non-finite samples are treated as silence.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| finite_or_zero(s) as f64)
        .map(|s| s * s)
        .sum();
    (sum_squares / samples.len() as f64).sqrt()
}

/// Fraction of adjacent sample pairs that change sign, in [0, 1]
pub fn zero_crossing_rate(samples: &[f32]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| {
            let (a, b) = (finite_or_zero(w[0]), finite_or_zero(w[1]));
            (a >= 0.0 && b < 0.0) || (a < 0.0 && b >= 0.0)
        })
        .count();
    Some(crossings as f64 / (samples.len() - 1) as f64)
}

/// Level in dB relative to full scale; `None` for silence
pub fn dbfs(rms_level: f64) -> Option<f64> {
    if rms_level <= SILENCE_RMS || !rms_level.is_finite() {
        return None;
    }
    Some(20.0 * rms_level.log10())
}

/// Amplitude-envelope coefficient of variation (std(|x|) / mean(|x|))
pub fn amplitude_cv(samples: &[f32]) -> Option<f64> {
    let envelope: Vec<f64> = samples
        .iter()
        .map(|&s| finite_or_zero(s).abs() as f64)
        .collect();
    coefficient_of_variation(&envelope)
}

pub fn finite_or_zero(sample: f32) -> f32 {
    if sample.is_finite() {
        sample
    } else {
        0.0
    }
}

/// Split into overlapping frames
///
/// Only full frames are returned, except that a non-empty buffer shorter
/// than one frame yields itself as the single frame.
pub fn frames(samples: &[f32], frame_len: usize, hop: usize) -> Vec<&[f32]> {
    if samples.is_empty() || frame_len == 0 || hop == 0 {
        return Vec::new();
    }
    if samples.len() < frame_len {
        return vec![samples];
    }
    (0..=(samples.len() - frame_len))
        .step_by(hop)
        .map(|start| &samples[start..start + frame_len])
        .collect()
}

/// Frame length and hop (in samples) for the given durations
pub fn frame_geometry(sample_rate: u32, frame_seconds: f64, hop_seconds: f64) -> (usize, usize) {
    let frame_len = ((sample_rate as f64 * frame_seconds).round() as usize).max(1);
    let hop = ((sample_rate as f64 * hop_seconds).round() as usize).max(1);
    (frame_len, hop)
}

// ============================================================================
// Autocorrelation pitch
// ============================================================================

/// Pitch estimate for a single frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePitch {
    /// Fundamental frequency in Hz
    pub frequency: f64,
    /// Normalized autocorrelation at the chosen lag (0..1)
    pub strength: f64,
}

/// Autocorrelation pitch estimate for one frame
///
/// Picks the shortest lag whose normalized autocorrelation is a local
/// maximum within 90% of the global best, which avoids octave-down
/// errors on strongly periodic input. Returns `None` for silent or
/// unvoiced frames.
pub fn autocorrelation_pitch(
    frame: &[f32],
    sample_rate: u32,
    floor_hz: f64,
    ceiling_hz: f64,
) -> Option<FramePitch> {
    let sr = sample_rate as f64;
    let min_lag = (sr / ceiling_hz).floor().max(1.0) as usize;
    let max_lag = (sr / floor_hz).ceil() as usize;
    if frame.len() < max_lag * 2 || min_lag >= max_lag {
        return None;
    }

    let mean = frame.iter().map(|&s| finite_or_zero(s) as f64).sum::<f64>() / frame.len() as f64;
    let x: Vec<f64> = frame.iter().map(|&s| finite_or_zero(s) as f64 - mean).collect();
    let energy: f64 = x.iter().map(|v| v * v).sum();
    if energy / (x.len() as f64) < SILENCE_RMS * SILENCE_RMS {
        return None;
    }

    let correlations: Vec<f64> = (min_lag..=max_lag + 1)
        .map(|lag| normalized_autocorrelation(&x, lag))
        .collect();

    let best = correlations[..correlations.len() - 1]
        .iter()
        .copied()
        .fold(f64::MIN, f64::max);
    if best < VOICING_THRESHOLD {
        return None;
    }

    // correlations[i] is the lag min_lag + i
    let mut chosen = None;
    for i in 1..correlations.len() - 1 {
        let r = correlations[i];
        if r >= correlations[i - 1] && r >= correlations[i + 1] && r >= best * 0.9 {
            chosen = Some(i);
            break;
        }
    }
    let i = chosen?;

    // Parabolic interpolation around the peak
    let (a, b, c) = (correlations[i - 1], correlations[i], correlations[i + 1]);
    let denom = a - 2.0 * b + c;
    let offset = if denom.abs() > 1e-12 {
        (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    let lag = (min_lag + i) as f64 + offset;
    let frequency = sr / lag;

    if frequency < floor_hz || frequency > ceiling_hz {
        return None;
    }

    Some(FramePitch {
        frequency,
        strength: b.clamp(0.0, 1.0),
    })
}

/// Normalized autocorrelation of `x` at `lag`, in [-1, 1]
pub fn normalized_autocorrelation(x: &[f64], lag: usize) -> f64 {
    if lag >= x.len() {
        return 0.0;
    }
    let n = x.len() - lag;
    let mut cross = 0.0;
    let mut e0 = 0.0;
    let mut e1 = 0.0;
    for i in 0..n {
        cross += x[i] * x[i + lag];
        e0 += x[i] * x[i];
        e1 += x[i + lag] * x[i + lag];
    }
    let norm = (e0 * e1).sqrt();
    if norm <= 0.0 {
        0.0
    } else {
        cross / norm
    }
}
