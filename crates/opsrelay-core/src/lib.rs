//! # OpsRelay Core
//!
//! Shared foundation for the OpsRelay workspace: configuration loading,
//! the error taxonomy, the pipeline data model, and the seam traits
//! (`FileSource`, `NotifySink`) that the watch pipeline is written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use traits::{FileSource, NotifySink};
pub use types::{FileRecord, ForwardOutcome, ForwardSummary, HistoryEntry, WatchStatus};
