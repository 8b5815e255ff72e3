//! vbm-analysis library interface
//!
//! Speech biomarker extraction: a cascading feature-extraction engine for
//! acoustic and linguistic metrics, wrapped in an analysis job state machine
//! that runs each extraction on an isolated worker.

pub mod audio;
pub mod config;
pub mod db;
pub mod dsp;
pub mod error;
pub mod extraction;
pub mod linguistic;
pub mod models;
pub mod providers;
pub mod reports;
pub mod types;
pub mod vocal;
pub mod workflow;

pub use crate::error::{AnalysisError, Result};
pub use crate::types::{ExtractionOutcome, MetricResult, Tier};
