//! Seam traits between the watch pipeline and its external collaborators.
//!
//! The pipeline is written against these traits; the Drive adapter and the
//! Messenger channel implement them, and tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::FileRecord;

/// Lists files in a folder, newest first.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// List PDF files in `folder_id`, optionally bounded to files created
    /// after `since`. Ordered by creation time descending, trashed items
    /// excluded.
    async fn list_pdfs(
        &self,
        folder_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FileRecord>>;
}

/// Sends a text message to a recipient identifier.
///
/// Callers are responsible for chunking text to the platform limit before
/// calling `send`.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<()>;
}
