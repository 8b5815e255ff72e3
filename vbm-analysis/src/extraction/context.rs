//! Per-run extraction context
//!
//! Borrowed view of the normalized buffer plus lazily computed analysis
//! products. Several metrics share one pitch track or one spectrogram, so
//! each product is computed at most once per run, by whichever provider
//! asks first.

use std::sync::OnceLock;

use crate::audio::NormalizedAudio;
use crate::dsp::{self, lpc, onset, spectral, FramePitch};
use crate::providers::toolkit::{PitchTrack, PointProcess, ToolkitError};

/// Frame length for secondary pitch tracking (seconds)
const PITCH_FRAME_SECONDS: f64 = 0.04;
const PITCH_HOP_SECONDS: f64 = 0.01;

/// Frame-level pitch analysis
#[derive(Debug, Clone, Default)]
pub struct FrameAnalysis {
    /// One entry per voiced frame
    pub pitches: Vec<FramePitch>,
    /// Peak absolute amplitude of each voiced frame
    pub voiced_peaks: Vec<f64>,
}

impl FrameAnalysis {
    pub fn frequencies(&self) -> Vec<f64> {
        self.pitches.iter().map(|p| p.frequency).collect()
    }
}

/// Spectrogram-derived products
#[derive(Debug, Clone)]
pub struct SpectrumAnalysis {
    pub summary: Option<spectral::SpectralSummary>,
    /// Long-term average magnitude spectrum
    pub average: Vec<f64>,
    pub n_fft: usize,
    pub sample_rate: u32,
}

pub struct ExtractionContext<'a> {
    recording_id: &'a str,
    audio: &'a NormalizedAudio,
    frames: OnceLock<FrameAnalysis>,
    spectrum: OnceLock<Option<SpectrumAnalysis>>,
    timing: OnceLock<Option<onset::SpeechTiming>>,
    formants: OnceLock<Option<lpc::Formants>>,
    pub(crate) toolkit_pitch: OnceLock<Result<PitchTrack, ToolkitError>>,
    pub(crate) toolkit_points: OnceLock<Result<PointProcess, ToolkitError>>,
    pub(crate) toolkit_hnr: OnceLock<Result<f64, ToolkitError>>,
    pub(crate) toolkit_formants: OnceLock<Result<lpc::Formants, ToolkitError>>,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(recording_id: &'a str, audio: &'a NormalizedAudio) -> Self {
        Self {
            recording_id,
            audio,
            frames: OnceLock::new(),
            spectrum: OnceLock::new(),
            timing: OnceLock::new(),
            formants: OnceLock::new(),
            toolkit_pitch: OnceLock::new(),
            toolkit_points: OnceLock::new(),
            toolkit_hnr: OnceLock::new(),
            toolkit_formants: OnceLock::new(),
        }
    }

    pub fn recording_id(&self) -> &str {
        self.recording_id
    }

    pub fn audio(&self) -> &NormalizedAudio {
        self.audio
    }

    pub fn samples(&self) -> &[f32] {
        &self.audio.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    /// Autocorrelation pitch on 40 ms frames (10 ms hop)
    pub fn frame_analysis(&self) -> &FrameAnalysis {
        self.frames.get_or_init(|| {
            let sr = self.sample_rate();
            if sr == 0 {
                return FrameAnalysis::default();
            }
            let (frame_len, hop) = dsp::frame_geometry(sr, PITCH_FRAME_SECONDS, PITCH_HOP_SECONDS);
            let mut analysis = FrameAnalysis::default();
            for frame in dsp::frames(self.samples(), frame_len, hop) {
                if let Some(pitch) =
                    dsp::autocorrelation_pitch(frame, sr, dsp::PITCH_FLOOR_HZ, dsp::PITCH_CEILING_HZ)
                {
                    let peak = frame
                        .iter()
                        .map(|&s| dsp::finite_or_zero(s).abs() as f64)
                        .fold(0.0, f64::max);
                    analysis.pitches.push(pitch);
                    analysis.voiced_peaks.push(peak);
                }
            }
            analysis
        })
    }

    /// STFT summary and long-term average spectrum
    pub fn spectrum(&self) -> Option<&SpectrumAnalysis> {
        self.spectrum
            .get_or_init(|| {
                let sr = self.sample_rate();
                let spectrogram =
                    spectral::Spectrogram::compute(self.samples(), sr, spectral::N_FFT, spectral::HOP)?;
                Some(SpectrumAnalysis {
                    summary: spectrogram.summarize(),
                    average: spectrogram.average_spectrum(),
                    n_fft: spectrogram.n_fft,
                    sample_rate: sr,
                })
            })
            .as_ref()
    }

    pub fn speech_timing(&self) -> Option<onset::SpeechTiming> {
        *self
            .timing
            .get_or_init(|| onset::speech_timing(self.samples(), self.sample_rate()))
    }

    /// LPC formants of the buffer
    pub fn lpc_formants(&self) -> Option<lpc::Formants> {
        *self
            .formants
            .get_or_init(|| lpc::estimate_formants(self.samples(), self.sample_rate()))
    }
}
