//! STFT-based spectral descriptors
//!
//! Magnitude spectrogram with a Hann window, then per-frame centroid,
//! bandwidth, contrast, flatness, rolloff, chroma and the first
//! mel-cepstral coefficient, averaged over frames that carry energy.

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

/// FFT size used for spectral features
pub const N_FFT: usize = 2048;
/// Hop between STFT frames
pub const HOP: usize = 512;
/// Mel bands for the cepstral coefficient
pub const N_MELS: usize = 40;
/// Fraction of spectral energy below the rolloff frequency
pub const ROLLOFF_FRACTION: f64 = 0.85;

const EPS: f64 = 1e-10;

/// Magnitude spectrogram
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub sample_rate: u32,
    pub n_fft: usize,
    /// One magnitude vector (n_fft / 2 + 1 bins) per frame
    pub frames: Vec<Vec<f64>>,
}

/// Frame-averaged spectral descriptors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralSummary {
    pub centroid_hz: f64,
    pub bandwidth_hz: f64,
    pub contrast_db: f64,
    pub flatness: f64,
    pub rolloff_hz: f64,
    pub chroma_mean: f64,
    pub mfcc_1: f64,
    /// Number of frames that carried energy
    pub active_frames: usize,
}

impl Spectrogram {
    /// Short-time Fourier transform of the buffer
    ///
    /// Buffers shorter than one FFT are zero-padded into a single frame.
    /// Returns `None` for an empty buffer.
    pub fn compute(samples: &[f32], sample_rate: u32, n_fft: usize, hop: usize) -> Option<Self> {
        if samples.is_empty() || n_fft < 2 || hop == 0 {
            return None;
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let window = hann_window(n_fft);
        let bins = n_fft / 2 + 1;

        let starts: Vec<usize> = if samples.len() <= n_fft {
            vec![0]
        } else {
            (0..=(samples.len() - n_fft)).step_by(hop).collect()
        };

        let mut frames = Vec::with_capacity(starts.len());
        let mut buffer = vec![Complex32::new(0.0, 0.0); n_fft];
        for start in starts {
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = samples
                    .get(start + i)
                    .copied()
                    .map(super::finite_or_zero)
                    .unwrap_or(0.0);
                *slot = Complex32::new(sample * window[i], 0.0);
            }
            fft.process(&mut buffer);
            frames.push(buffer[..bins].iter().map(|c| c.norm() as f64).collect());
        }

        Some(Self {
            sample_rate,
            n_fft,
            frames,
        })
    }

    /// Center frequency of bin `k`
    pub fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.sample_rate as f64 / self.n_fft as f64
    }

    pub fn bin_count(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Mean magnitude per bin across all frames
    pub fn average_spectrum(&self) -> Vec<f64> {
        let bins = self.bin_count();
        let mut average = vec![0.0; bins];
        if self.frames.is_empty() {
            return average;
        }
        for frame in &self.frames {
            for (acc, &m) in average.iter_mut().zip(frame) {
                *acc += m;
            }
        }
        let count = self.frames.len() as f64;
        average.iter_mut().for_each(|v| *v /= count);
        average
    }

    /// Frame-averaged descriptors over frames with energy
    ///
    /// Returns `None` when every frame is silent.
    pub fn summarize(&self) -> Option<SpectralSummary> {
        let freqs: Vec<f64> = (0..self.bin_count()).map(|k| self.bin_frequency(k)).collect();
        let mel_bank = mel_filter_bank(self.sample_rate, self.n_fft, N_MELS);

        let mut centroid = Vec::new();
        let mut bandwidth = Vec::new();
        let mut contrast = Vec::new();
        let mut flatness = Vec::new();
        let mut rolloff = Vec::new();
        let mut chroma = Vec::new();
        let mut mfcc = Vec::new();

        for frame in &self.frames {
            let total: f64 = frame.iter().sum();
            if total <= EPS {
                continue;
            }
            let c = frame.iter().zip(&freqs).map(|(m, f)| m * f).sum::<f64>() / total;
            let bw = (frame
                .iter()
                .zip(&freqs)
                .map(|(m, f)| m * (f - c) * (f - c))
                .sum::<f64>()
                / total)
                .sqrt();
            centroid.push(c);
            bandwidth.push(bw);
            flatness.push(frame_flatness(frame));
            rolloff.push(frame_rolloff(frame, &freqs, ROLLOFF_FRACTION));
            if let Some(value) = frame_contrast(frame, &freqs) {
                contrast.push(value);
            }
            if let Some(value) = frame_chroma_mean(frame, &freqs) {
                chroma.push(value);
            }
            mfcc.push(frame_first_mfcc(frame, &mel_bank));
        }

        if centroid.is_empty() {
            return None;
        }

        Some(SpectralSummary {
            centroid_hz: super::mean(&centroid)?,
            bandwidth_hz: super::mean(&bandwidth)?,
            contrast_db: super::mean(&contrast).unwrap_or(0.0),
            flatness: super::mean(&flatness)?,
            rolloff_hz: super::mean(&rolloff)?,
            chroma_mean: super::mean(&chroma).unwrap_or(0.0),
            mfcc_1: super::mean(&mfcc)?,
            active_frames: centroid.len(),
        })
    }
}

pub fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()
        })
        .collect()
}

/// Geometric mean over arithmetic mean of the power spectrum, in [0, 1]
fn frame_flatness(frame: &[f64]) -> f64 {
    let power: Vec<f64> = frame.iter().map(|m| m * m + EPS).collect();
    let log_mean = power.iter().map(|p| p.ln()).sum::<f64>() / power.len() as f64;
    let arithmetic = power.iter().sum::<f64>() / power.len() as f64;
    (log_mean.exp() / arithmetic).clamp(0.0, 1.0)
}

fn frame_rolloff(frame: &[f64], freqs: &[f64], fraction: f64) -> f64 {
    let total: f64 = frame.iter().sum();
    let threshold = total * fraction;
    let mut cumulative = 0.0;
    for (m, f) in frame.iter().zip(freqs) {
        cumulative += m;
        if cumulative >= threshold {
            return *f;
        }
    }
    freqs.last().copied().unwrap_or(0.0)
}

/// Mean peak-to-valley difference (dB) over octave sub-bands
///
/// Each band contributes 10·log10 of the mean power in its top 2% of bins
/// over the mean power in its bottom 2%.
fn frame_contrast(frame: &[f64], freqs: &[f64]) -> Option<f64> {
    let nyquist = freqs.last().copied()?;
    let mut edges = vec![0.0, 200.0];
    while let Some(&last) = edges.last() {
        let next = last * 2.0;
        if next >= nyquist || edges.len() > 6 {
            break;
        }
        edges.push(next);
    }
    edges.push(nyquist + 1.0);

    let mut diffs = Vec::new();
    for band in edges.windows(2) {
        let mut power: Vec<f64> = frame
            .iter()
            .zip(freqs)
            .filter(|&(_, &f)| f >= band[0] && f < band[1])
            .map(|(m, _)| m * m)
            .collect();
        if power.len() < 2 {
            continue;
        }
        power.sort_by(|a, b| a.total_cmp(b));
        let k = ((power.len() as f64 * 0.02).round() as usize).max(1);
        let valley = power[..k].iter().sum::<f64>() / k as f64;
        let peak = power[power.len() - k..].iter().sum::<f64>() / k as f64;
        diffs.push(10.0 * ((peak + EPS) / (valley + EPS)).log10());
    }
    super::mean(&diffs)
}

/// Mean of the 12 pitch-class energies after normalizing by the largest
fn frame_chroma_mean(frame: &[f64], freqs: &[f64]) -> Option<f64> {
    let mut classes = [0.0f64; 12];
    for (m, &f) in frame.iter().zip(freqs) {
        if f < 27.5 {
            continue;
        }
        let midi = 69.0 + 12.0 * (f / 440.0).log2();
        let class = (midi.round() as i64).rem_euclid(12) as usize;
        classes[class] += m * m;
    }
    let max = classes.iter().copied().fold(0.0, f64::max);
    if max <= EPS {
        return None;
    }
    Some(classes.iter().map(|c| c / max).sum::<f64>() / 12.0)
}

/// First cepstral coefficient: orthonormal DCT-II term 0 of log mel power
fn frame_first_mfcc(frame: &[f64], mel_bank: &[Vec<f64>]) -> f64 {
    let n = mel_bank.len().max(1) as f64;
    let log_energies: f64 = mel_bank
        .iter()
        .map(|filter| {
            let energy: f64 = filter.iter().zip(frame).map(|(w, m)| w * m * m).sum();
            10.0 * energy.max(EPS).log10()
        })
        .sum();
    log_energies * (1.0 / n).sqrt()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters over the `n_fft / 2 + 1` bins
pub fn mel_filter_bank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
    let bins = n_fft / 2 + 1;
    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_hz = |k: usize| k as f64 * sample_rate as f64 / n_fft as f64;

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (points[m], points[m + 1], points[m + 2]);
            (0..bins)
                .map(|k| {
                    let f = bin_hz(k);
                    if f <= left || f >= right {
                        0.0
                    } else if f <= center {
                        (f - left) / (center - left)
                    } else {
                        (right - f) / (right - center)
                    }
                })
                .collect()
        })
        .collect()
}

/// Frequency of the strongest bin within `[lo_hz, hi_hz]`
pub fn peak_frequency(spectrum: &[f64], sample_rate: u32, n_fft: usize, lo_hz: f64, hi_hz: f64) -> Option<f64> {
    let bin_hz = sample_rate as f64 / n_fft as f64;
    spectrum
        .iter()
        .enumerate()
        .map(|(k, &m)| (k as f64 * bin_hz, m))
        .filter(|(f, m)| *f >= lo_hz && *f <= hi_hz && *m > EPS)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(f, _)| f)
}
