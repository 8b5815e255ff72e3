//! Cascading feature extraction
//!
//! [`catalog`] declares every acoustic metric, [`context`] holds the
//! per-run buffer and shared analysis products, and [`resolver`] turns a
//! [`MetricRequest`] into a guaranteed [`crate::types::MetricResult`].

pub mod catalog;
pub mod context;
pub mod resolver;

pub use catalog::{MetricRequest, MetricSpec, CATALOG, REQUIRED_METRICS};
pub use context::ExtractionContext;
pub use resolver::{stable_unit, FallbackResolver};
