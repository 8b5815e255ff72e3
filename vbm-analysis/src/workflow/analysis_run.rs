//! One extraction run: both pipelines over one recording

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use super::worker_pool::{JobDescription, JobRunner};
use crate::audio::AudioIngest;
use crate::config::AnalysisSettings;
use crate::linguistic::models::ModelRegistry;
use crate::linguistic::LinguisticPipeline;
use crate::models::AnalysisResults;
use crate::vocal::VocalPipeline;

/// Pipelines and their shared services, built once per process
pub struct AnalysisServices {
    ingest: AudioIngest,
    vocal: VocalPipeline,
    linguistic: Arc<LinguisticPipeline>,
    vocal_sample_rate: u32,
}

impl AnalysisServices {
    pub fn new(settings: AnalysisSettings, registry: Arc<ModelRegistry>) -> Self {
        Self {
            ingest: AudioIngest::new(settings.clone()),
            vocal: VocalPipeline::from_settings(&settings),
            linguistic: Arc::new(LinguisticPipeline::new(registry, settings.clone())),
            vocal_sample_rate: settings.vocal_sample_rate,
        }
    }

    /// Swap in a differently configured vocal pipeline
    pub fn with_vocal(mut self, vocal: VocalPipeline) -> Self {
        self.vocal = vocal;
        self
    }

    pub fn vocal(&self) -> &VocalPipeline {
        &self.vocal
    }
}

impl JobRunner for AnalysisServices {
    /// Linguistic analysis runs as a task on the runtime while vocal
    /// extraction runs on this worker thread
    fn run(&self, job: &JobDescription, rt: &Handle) -> AnalysisResults {
        let linguistic = Arc::clone(&self.linguistic);
        let path = job.recording_path.clone();
        let linguistic_task = rt.spawn(async move { linguistic.run(&path).await });

        let vocal = match rt.block_on(self.ingest.load(&job.recording_path, self.vocal_sample_rate)) {
            Ok(audio) => Some(self.vocal.run(&job.recording_id, &audio)),
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Recording could not be loaded for vocal analysis");
                None
            }
        };

        let linguistic = match rt.block_on(linguistic_task) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Linguistic analysis task failed");
                None
            }
        };

        info!(
            job_id = %job.job_id,
            vocal = vocal.as_ref().map(|v| v.method.as_str()).unwrap_or("none"),
            transcript = linguistic.as_ref().map(|b| !b.transcript_text.is_empty()).unwrap_or(false),
            "Extraction run finished"
        );
        AnalysisResults { vocal, linguistic }
    }
}
