//! Onset detection and non-silent duration for speech-rate estimates
//!
//! Onsets are peaks in the positive log-energy difference of 25 ms frames
//! (10 ms hop). Each onset is counted as one syllable nucleus.

use super::{frame_geometry, frames, rms};

const FRAME_SECONDS: f64 = 0.025;
const HOP_SECONDS: f64 = 0.010;
/// Minimum spacing between two onsets
const MIN_ONSET_GAP_SECONDS: f64 = 0.1;
/// Frames quieter than the loudest frame by this much count as silence
const SILENCE_TOP_DB: f64 = 20.0;

/// Onset count and durations for one buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechTiming {
    pub onsets: usize,
    pub total_seconds: f64,
    pub non_silent_seconds: f64,
}

impl SpeechTiming {
    /// Onsets per second over the whole recording
    pub fn speech_rate(&self) -> f64 {
        if self.total_seconds <= 0.0 {
            return 0.0;
        }
        self.onsets as f64 / self.total_seconds
    }

    /// Onsets per second of non-silent audio; 0.0 when nothing is voiced
    pub fn articulation_rate(&self) -> f64 {
        if self.non_silent_seconds <= 0.0 {
            return 0.0;
        }
        self.onsets as f64 / self.non_silent_seconds
    }
}

/// Measure onsets and speaking time; `None` when the buffer is too short
/// for onset detection (fewer than three frames)
pub fn speech_timing(samples: &[f32], sample_rate: u32) -> Option<SpeechTiming> {
    if sample_rate == 0 {
        return None;
    }
    let (frame_len, hop) = frame_geometry(sample_rate, FRAME_SECONDS, HOP_SECONDS);
    if samples.len() < frame_len {
        return None;
    }
    let levels: Vec<f64> = frames(samples, frame_len, hop).iter().map(|f| rms(f)).collect();
    if levels.len() < 3 {
        return None;
    }

    let threshold = silence_threshold(&levels, SILENCE_TOP_DB);
    let onsets = pick_onsets(&levels, threshold, sample_rate, hop);
    let total_seconds = samples.len() as f64 / sample_rate as f64;
    let voiced_frames = levels.iter().filter(|&&l| l > threshold).count();
    let non_silent_seconds = (voiced_frames as f64 * hop as f64 / sample_rate as f64).min(total_seconds);

    Some(SpeechTiming {
        onsets,
        total_seconds,
        non_silent_seconds,
    })
}

/// Level below which a frame is silent; `f64::INFINITY` when every frame
/// is digital silence
fn silence_threshold(levels: &[f64], top_db: f64) -> f64 {
    let loudest = levels.iter().copied().fold(0.0, f64::max);
    if loudest <= 0.0 {
        return f64::INFINITY;
    }
    loudest * 10f64.powf(-top_db / 20.0)
}

fn pick_onsets(levels: &[f64], silence: f64, sample_rate: u32, hop: usize) -> usize {
    let log_energy: Vec<f64> = levels.iter().map(|l| (l * l + 1e-10).ln()).collect();
    let flux: Vec<f64> = log_energy
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();

    let (Some(m), Some(s)) = (super::mean(&flux), super::std_dev(&flux)) else {
        return 0;
    };
    let threshold = m + 0.5 * s;
    let min_gap = ((MIN_ONSET_GAP_SECONDS * sample_rate as f64) / hop as f64).ceil() as usize;

    let mut count = 0;
    let mut last: Option<usize> = None;
    for i in 0..flux.len() {
        let value = flux[i];
        if value <= 0.0 || value <= threshold {
            continue;
        }
        let left = if i > 0 { flux[i - 1] } else { 0.0 };
        let right = flux.get(i + 1).copied().unwrap_or(0.0);
        if value < left || value < right {
            continue;
        }
        // flux[i] is the step into frame i + 1, which may only partly
        // overlap the new sound
        let ahead_end = (i + 1 + min_gap).min(levels.len());
        let ahead = levels[i + 1..ahead_end].iter().copied().fold(0.0, f64::max);
        if ahead <= silence {
            continue;
        }
        if let Some(previous) = last {
            if i - previous < min_gap {
                continue;
            }
        }
        last = Some(i);
        count += 1;
    }
    count
}
