//! Job runners and models with scripted behavior

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use tokio::runtime::Handle;

use vbm_analysis::linguistic::models::{ModelError, SpeechToText};
use vbm_analysis::models::AnalysisResults;
use vbm_analysis::types::{ExtractionOutcome, MetricResult, Tier};
use vbm_analysis::workflow::{JobDescription, JobRunner};

/// Produces nothing from either pipeline
pub struct EmptyRunner;

impl JobRunner for EmptyRunner {
    fn run(&self, _: &JobDescription, _: &Handle) -> AnalysisResults {
        AnalysisResults::default()
    }
}

/// Returns one secondary-tier pitch value for every job
#[derive(Default)]
pub struct StaticResultsRunner {
    pub calls: AtomicUsize,
}

impl StaticResultsRunner {
    pub fn results() -> AnalysisResults {
        AnalysisResults {
            vocal: Some(ExtractionOutcome::new(vec![MetricResult {
                name: "mean_pitch_hz".to_string(),
                value: 160.0,
                unit: "Hz".to_string(),
                tier_used: Tier::Secondary,
                provenance_note: "signal".to_string(),
            }])),
            linguistic: None,
        }
    }
}

impl JobRunner for StaticResultsRunner {
    fn run(&self, _: &JobDescription, _: &Handle) -> AnalysisResults {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Self::results()
    }
}

/// Crashes on the first job, then delegates
pub struct FlakyRunner<R> {
    crashed: AtomicBool,
    inner: R,
}

impl<R> FlakyRunner<R> {
    pub fn new(inner: R) -> Self {
        Self {
            crashed: AtomicBool::new(false),
            inner,
        }
    }
}

impl<R: JobRunner> JobRunner for FlakyRunner<R> {
    fn run(&self, job: &JobDescription, rt: &Handle) -> AnalysisResults {
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("worker killed while processing {}", job.job_id);
        }
        self.inner.run(job, rt)
    }
}

/// Blocks each job until the test joins the barrier
pub struct GatedRunner {
    pub gate: Arc<Barrier>,
}

impl GatedRunner {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Barrier::new(2)),
        }
    }
}

impl JobRunner for GatedRunner {
    fn run(&self, _: &JobDescription, _: &Handle) -> AnalysisResults {
        self.gate.wait();
        StaticResultsRunner::results()
    }
}

/// Speech-to-text returning a fixed transcript
pub struct FixedTranscriber(pub &'static str);

#[async_trait]
impl SpeechToText for FixedTranscriber {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn transcribe(&self, _: &Path) -> Result<String, ModelError> {
        Ok(self.0.to_string())
    }
}
