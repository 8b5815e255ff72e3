//! Audio Test Fixture Generator
//!
//! Writes WAV recordings with hound

use std::path::{Path, PathBuf};

/// What the generated recording contains
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Content {
    Silence,
    /// Harmonic-rich voiced tone at this fundamental
    Voiced(f64),
}

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub content: Content,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 2.0,
            sample_rate: 22_050,
            channels: 1,
            content: Content::Voiced(160.0),
        }
    }
}

/// Fundamental plus four decaying harmonics, peak below 0.7
pub fn voiced_samples(frequency: f64, sample_rate: u32, seconds: f64) -> Vec<f32> {
    let n = (sample_rate as f64 * seconds) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let v: f64 = (1..=5)
                .map(|h| (2.0 * std::f64::consts::PI * frequency * h as f64 * t).sin() / h as f64)
                .sum();
            (0.3 * v) as f32
        })
        .collect()
}

/// Generate a 16-bit PCM WAV file
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let samples = match config.content {
        Content::Silence => vec![0.0f32; (config.duration_seconds * config.sample_rate as f64) as usize],
        Content::Voiced(f0) => voiced_samples(f0, config.sample_rate, config.duration_seconds),
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;
    Ok(path.to_path_buf())
}
