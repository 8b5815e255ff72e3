//! Test Helper Utilities
//!
//! Shared utilities for testing vbm-analysis

#![allow(dead_code, unused_imports)]

pub mod audio_generator;
pub mod job_utils;
pub mod mocks;

pub use audio_generator::{generate_test_wav, voiced_samples, AudioConfig, Content};
pub use job_utils::{create_test_controller, create_test_store, wait_for_status};
pub use mocks::{EmptyRunner, FixedTranscriber, FlakyRunner, GatedRunner, StaticResultsRunner};
