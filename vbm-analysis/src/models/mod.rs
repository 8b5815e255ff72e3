//! Job and result models

pub mod job;
pub mod results;

pub use job::{AnalysisJob, InvalidTransition, JobStatus, StateTransition};
pub use results::{AnalysisResults, MetricProvenance, ResultsProvenance};
