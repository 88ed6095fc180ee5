//! Error taxonomy for the watch pipeline.
//!
//! The categories matter at the cycle boundary: `Config` aborts a cycle
//! with no status write, `Auth`/`Source`/`Store` produce an error-status
//! record, and `Channel` failures are recorded inline in the status
//! record without failing the cycle.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or invalid configuration (folder id, credentials).
    #[error("Config error: {0}")]
    Config(String),

    /// Authentication against the file source failed.
    #[error("Auth failed: {0}")]
    Auth(String),

    /// Listing files from the upstream source failed.
    #[error("File source error: {0}")]
    Source(String),

    /// Local persistence (history, status, flow) failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Sending a notification failed.
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
