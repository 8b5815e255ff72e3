//! Vocal extraction pipeline properties over synthetic and fuzzed buffers

mod helpers;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use helpers::voiced_samples;
use vbm_analysis::audio::NormalizedAudio;
use vbm_analysis::config::AnalysisSettings;
use vbm_analysis::extraction::catalog::{
    lookup, JITTER_LOCAL_PERCENT, MEAN_F1_HZ, MEAN_F2_HZ, MEAN_HNR_DB, MEAN_PITCH_HZ, PITCH_RANGE_HZ,
    PITCH_STD_HZ, SHIMMER_LOCAL_PERCENT, SPEECH_RATE_SPS,
};
use vbm_analysis::dsp::lpc::Formants;
use vbm_analysis::extraction::{CATALOG, REQUIRED_METRICS};
use vbm_analysis::providers::{NativeToolkit, PitchTrack, PointProcess, ToolkitError, VoiceToolkit};
use vbm_analysis::types::Tier;
use vbm_analysis::vocal::VocalPipeline;

const RATE: u32 = 22_050;

fn audio(samples: Vec<f32>, rate: u32) -> NormalizedAudio {
    NormalizedAudio::from_samples(samples, rate, "fuzz.wav")
}

#[derive(Clone, Copy)]
enum Fault {
    HarmonicityFails,
    PerturbationPanics,
}

/// Native toolkit with one canary operation broken
struct FaultyToolkit {
    inner: NativeToolkit,
    fault: Fault,
}

impl FaultyToolkit {
    fn new(fault: Fault) -> Self {
        Self {
            inner: NativeToolkit::default(),
            fault,
        }
    }

    fn perturbation(
        &self,
        points: &PointProcess,
        read: fn(&NativeToolkit, &PointProcess) -> Result<f64, ToolkitError>,
    ) -> Result<f64, ToolkitError> {
        if let Fault::PerturbationPanics = self.fault {
            panic!("perturbation read crashed");
        }
        read(&self.inner, points)
    }
}

impl VoiceToolkit for FaultyToolkit {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn pitch_track(&self, audio: &NormalizedAudio) -> Result<PitchTrack, ToolkitError> {
        self.inner.pitch_track(audio)
    }

    fn point_process(&self, audio: &NormalizedAudio, pitch: &PitchTrack) -> Result<PointProcess, ToolkitError> {
        self.inner.point_process(audio, pitch)
    }

    fn harmonicity(&self, audio: &NormalizedAudio) -> Result<f64, ToolkitError> {
        match self.fault {
            Fault::HarmonicityFails => Err(ToolkitError::Unavailable("harmonicity missing".to_string())),
            Fault::PerturbationPanics => self.inner.harmonicity(audio),
        }
    }

    fn jitter_local(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        self.perturbation(points, NativeToolkit::jitter_local)
    }

    fn jitter_rap(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        self.perturbation(points, NativeToolkit::jitter_rap)
    }

    fn shimmer_local(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        self.perturbation(points, NativeToolkit::shimmer_local)
    }

    fn shimmer_apq11(&self, points: &PointProcess) -> Result<f64, ToolkitError> {
        self.perturbation(points, NativeToolkit::shimmer_apq11)
    }

    fn formants(&self, audio: &NormalizedAudio) -> Result<Formants, ToolkitError> {
        self.inner.formants(audio)
    }
}

fn toolkit_disabled() -> AnalysisSettings {
    AnalysisSettings {
        toolkit_enabled: false,
        ..Default::default()
    }
}

/// Empty, all-zero, noise, tones, clipped and non-finite buffers
fn fuzz_buffer(rng: &mut StdRng, case: usize) -> Vec<f32> {
    match case % 7 {
        0 => Vec::new(),
        1 => vec![0.0; rng.gen_range(1..4096)],
        2 => (0..rng.gen_range(1..4096)).map(|_| rng.gen_range(-1.0f32..1.0)).collect(),
        3 => {
            let f0 = rng.gen_range(60.0..500.0);
            let seconds = rng.gen_range(0.01..0.3);
            voiced_samples(f0, RATE, seconds)
        }
        4 => (0..rng.gen_range(1..4096)).map(|_| if rng.gen_bool(0.5) { 1.0 } else { -1.0 }).collect(),
        5 => {
            let mut samples: Vec<f32> = (0..rng.gen_range(2..2048)).map(|_| rng.gen_range(-0.5f32..0.5)).collect();
            let at = rng.gen_range(0..samples.len());
            samples[at] = if rng.gen_bool(0.5) { f32::NAN } else { f32::INFINITY };
            samples
        }
        _ => vec![rng.gen_range(-1e-6f32..1e-6); rng.gen_range(1..64)],
    }
}

#[test]
fn test_required_metrics_present_for_any_buffer() {
    let pipeline = VocalPipeline::from_settings(&AnalysisSettings::default());
    let inputs = vec![
        Vec::new(),
        vec![0.0; RATE as usize],
        vec![f32::NAN; 512],
        vec![1.0; 3],
        voiced_samples(140.0, RATE, 1.0),
    ];

    for (i, samples) in inputs.into_iter().enumerate() {
        let outcome = pipeline.run(&format!("rec-{}", i), &audio(samples, RATE));
        for name in REQUIRED_METRICS {
            let spec = lookup(name).unwrap();
            let result = outcome.get(name).unwrap_or_else(|| panic!("case {}: {} missing", i, name));
            assert!(result.value.is_finite(), "case {}: {} not finite", i, name);
            assert!(spec.contains(result.value), "case {}: {} = {}", i, name, result.value);
        }
    }
}

#[test]
fn test_failed_probe_never_reports_primary() {
    let pipeline = VocalPipeline::from_settings(&toolkit_disabled());
    assert!(!pipeline.probe().available);

    let toolkit_metrics = [
        MEAN_PITCH_HZ,
        PITCH_STD_HZ,
        PITCH_RANGE_HZ,
        JITTER_LOCAL_PERCENT,
        SHIMMER_LOCAL_PERCENT,
        MEAN_HNR_DB,
        MEAN_F1_HZ,
        MEAN_F2_HZ,
    ];
    for f0 in [110.0, 180.0, 240.0] {
        let outcome = pipeline.run("rec", &audio(voiced_samples(f0, RATE, 1.0), RATE));
        for name in toolkit_metrics {
            assert_ne!(outcome.get(name).unwrap().tier_used, Tier::Primary, "{}", name);
        }
        assert!(!outcome.method.starts_with("primary"));
    }
}

#[test]
fn test_one_broken_canary_disables_primary_tier() {
    for fault in [Fault::HarmonicityFails, Fault::PerturbationPanics] {
        let pipeline = VocalPipeline::new(Arc::new(FaultyToolkit::new(fault)), &AnalysisSettings::default());
        assert!(!pipeline.probe().available);
        assert_eq!(pipeline.probe().failures.len(), 1, "{:?}", pipeline.probe().failures);

        for (id, samples) in [("silent", vec![0.0; RATE as usize]), ("voiced", voiced_samples(150.0, RATE, 1.0))] {
            let outcome = pipeline.run(id, &audio(samples, RATE));
            assert_eq!(outcome.results.len(), CATALOG.len());
            assert!(outcome.results.iter().all(|r| r.tier_used != Tier::Primary));
            for name in REQUIRED_METRICS {
                assert!(outcome.get(name).is_some(), "{} missing", name);
            }
        }
    }
}

#[test]
fn test_bounds_hold_for_fuzzed_buffers() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let pipeline = VocalPipeline::from_settings(&AnalysisSettings::default());

    for case in 0..1000 {
        let samples = fuzz_buffer(&mut rng, case);
        let rate = [8_000, 16_000, RATE][case % 3];
        let outcome = pipeline.run(&format!("fuzz-{}", case), &audio(samples, rate));

        assert_eq!(outcome.results.len(), CATALOG.len(), "case {}", case);
        for result in &outcome.results {
            let spec = lookup(&result.name).unwrap();
            assert!(
                result.value >= spec.lo && result.value <= spec.hi,
                "case {}: {} = {} outside [{}, {}]",
                case,
                result.name,
                result.value,
                spec.lo,
                spec.hi
            );
        }
    }
}

#[test]
fn test_three_seconds_of_silence() {
    let pipeline = VocalPipeline::from_settings(&AnalysisSettings::default());
    let outcome = pipeline.run("silent", &audio(vec![0.0; 3 * RATE as usize], RATE));

    for name in [MEAN_PITCH_HZ, JITTER_LOCAL_PERCENT, SHIMMER_LOCAL_PERCENT] {
        let result = outcome.get(name).unwrap();
        assert_eq!(result.tier_used, Tier::Emergency, "{}", name);
        assert!(result.provenance_note.starts_with("synthetic:"));
    }
    assert!(outcome.value(SPEECH_RATE_SPS).unwrap().abs() < 1e-9);
}

#[test]
fn test_emergency_values_are_deterministic() {
    let pipeline = VocalPipeline::from_settings(&AnalysisSettings::default());
    let silence = audio(vec![0.0; RATE as usize], RATE);

    let first = pipeline.run("same-recording", &silence);
    let second = pipeline.run("same-recording", &silence);
    assert_eq!(first, second);

    let other = pipeline.run("other-recording", &silence);
    let pitch = |o: &vbm_analysis::ExtractionOutcome| o.value(MEAN_PITCH_HZ).unwrap();
    assert_ne!(pitch(&first), pitch(&other));
}
