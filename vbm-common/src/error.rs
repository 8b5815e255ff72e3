//! Errors raised while bootstrapping configuration and timestamps

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable TOML, bad values or an unusable root folder
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored data that does not parse back (timestamps, ids, statuses)
    #[error("Internal error: {0}")]
    Internal(String),
}
