//! Analysis job execution
//!
//! - `worker_pool`: isolated extraction threads, message passing in and out
//! - `analysis_run`: the work a worker does for one job
//! - `controller`: job lifecycle and status reconciliation

pub mod analysis_run;
pub mod controller;
pub mod worker_pool;

pub use analysis_run::AnalysisServices;
pub use controller::JobController;
pub use worker_pool::{JobDescription, JobRunner, WorkerFailure, WorkerPool};
