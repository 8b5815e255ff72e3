//! # VBM Common Library
//!
//! Shared code for the voice biomarker services:
//! - Error type shared by every crate in the workspace
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
