//! Watch scheduling — a single background task per manager, plus the
//! replay entry point used by the CLI.

use std::time::Duration;

use tokio::task::JoinHandle;

use opsrelay_core::error::{RelayError, Result};
use opsrelay_core::traits::{FileSource, NotifySink};
use opsrelay_core::types::{FileRecord, ForwardSummary};

use crate::cycle::{self, CycleOutcome, CycleSettings};
use crate::store::WatchDb;

/// Everything a running watch loop owns: settings, the open database,
/// and the source/sink implementations.
pub struct WatchContext {
    pub settings: CycleSettings,
    pub db: WatchDb,
    pub source: Box<dyn FileSource>,
    pub sink: Box<dyn NotifySink>,
    pub interval_secs: u64,
}

/// Owns at most one background watch task. Starting a new watch stops
/// the previous one first, so two loops never poll the same folder.
pub struct WatchManager {
    handle: Option<JoinHandle<()>>,
}

impl WatchManager {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the watch loop. An already-running loop is stopped first.
    pub fn start(&mut self, ctx: WatchContext) {
        self.stop();
        tracing::info!(
            "🔭 Watch started: folder {} every {}s",
            ctx.settings.folder_id,
            ctx.interval_secs
        );
        self.handle = Some(tokio::spawn(run_loop(ctx)));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::info!("Watch stopped");
        }
    }
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WatchManager {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(mut ctx: WatchContext) {
    let period = Duration::from_secs(ctx.interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);

    loop {
        ticker.tick().await;
        let outcome = cycle::run_cycle(
            &ctx.settings,
            ctx.source.as_ref(),
            ctx.sink.as_ref(),
            &mut ctx.db,
        )
        .await;
        match outcome {
            CycleOutcome::Completed { new_files, total } => {
                tracing::info!("Watch cycle done: {new_files} new of {total} in folder");
            }
            CycleOutcome::Skipped(reason) => {
                tracing::debug!("Watch cycle skipped: {reason}");
            }
            CycleOutcome::Errored(_) => {}
        }
    }
}

/// Re-forward previously discovered files without touching history or
/// status.
///
/// With `last_n` the newest N history entries are replayed; otherwise
/// the batch from the last cycle that found files is used.
pub async fn replay_recent(
    settings: &CycleSettings,
    db: &WatchDb,
    sink: &dyn NotifySink,
    last_n: Option<usize>,
) -> Result<ForwardSummary> {
    let files: Vec<FileRecord> = match last_n {
        Some(n) => db
            .recent_entries(n)?
            .iter()
            .map(|e| e.to_file())
            .collect(),
        None => {
            let status = db
                .load_status(&settings.watcher_id)?
                .ok_or_else(|| RelayError::Store("no status recorded yet".into()))?;
            let check = status.last_check_with_files.ok_or_else(|| {
                RelayError::Store("no previous cycle found files".into())
            })?;
            db.entries_by_ids(&check.file_ids)?
                .iter()
                .map(|e| e.to_file())
                .collect()
        }
    };

    if files.is_empty() {
        return Ok(ForwardSummary {
            ok: true,
            reason: Some("no_files".into()),
            ..Default::default()
        });
    }

    tracing::info!("🔁 Replaying {} file(s)", files.len());
    Ok(cycle::forward_files(db, settings, &files, sink).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use opsrelay_core::config::ForwardConfig;
    use opsrelay_core::types::{HistoryEntry, LastCheck, RunState, WatchStatus};
    use std::sync::Mutex;

    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotifySink for RecordingSink {
        async fn send(&self, recipient_id: &str, text: &str) -> opsrelay_core::error::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn entry(id: &str, name: &str, hours_ago: i64) -> HistoryEntry {
        let file = serde_json::from_str(&format!(
            r#"{{"id":"{id}","name":"{name}","createdTime":"2026-05-01T10:00:00Z"}}"#
        ))
        .unwrap();
        HistoryEntry::from_file(&file, Utc::now() - ChronoDuration::hours(hours_ago))
    }

    fn settings() -> CycleSettings {
        CycleSettings {
            watcher_id: "w1".into(),
            folder_id: "folder1".into(),
            since: None,
            fallback: ForwardConfig {
                enabled: true,
                recipient_id: "R1".into(),
                header: "New PDF files:".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_replay_last_n_uses_newest_entries() {
        let mut db = WatchDb::open_in_memory().unwrap();
        db.put_many(&[
            entry("old", "old.pdf", 48),
            entry("mid", "mid.pdf", 24),
            entry("new", "new.pdf", 1),
        ])
        .unwrap();
        let sink = RecordingSink::new();

        let summary = replay_recent(&settings(), &db, &sink, Some(2))
            .await
            .unwrap();
        assert!(summary.ok);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("new.pdf"));
        assert!(sent[0].1.contains("mid.pdf"));
        assert!(!sent[0].1.contains("old.pdf"));
    }

    #[tokio::test]
    async fn test_replay_without_n_uses_last_check_batch() {
        let mut db = WatchDb::open_in_memory().unwrap();
        db.put_many(&[entry("a", "a.pdf", 2), entry("b", "b.pdf", 1)])
            .unwrap();
        db.merge_status(
            "w1",
            &WatchStatus {
                last_run: Some(Utc::now()),
                status: Some(RunState::Ok),
                last_check_with_files: Some(LastCheck {
                    run_at: Utc::now(),
                    file_ids: vec!["a".into()],
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let sink = RecordingSink::new();

        let summary = replay_recent(&settings(), &db, &sink, None).await.unwrap();
        assert!(summary.ok);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("a.pdf"));
        assert!(!sent[0].1.contains("b.pdf"));
    }

    #[tokio::test]
    async fn test_replay_without_prior_batch_is_an_error() {
        let db = WatchDb::open_in_memory().unwrap();
        let sink = RecordingSink::new();
        let err = replay_recent(&settings(), &db, &sink, None).await;
        assert!(err.is_err());
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_replay_zero_entries_reports_no_files() {
        let db = WatchDb::open_in_memory().unwrap();
        let sink = RecordingSink::new();
        let summary = replay_recent(&settings(), &db, &sink, Some(5))
            .await
            .unwrap();
        assert!(summary.ok);
        assert_eq!(summary.reason.as_deref(), Some("no_files"));
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_manager_start_and_stop() {
        struct EmptySource;

        #[async_trait]
        impl opsrelay_core::traits::FileSource for EmptySource {
            async fn list_pdfs(
                &self,
                _folder_id: &str,
                _since: Option<chrono::DateTime<Utc>>,
            ) -> opsrelay_core::error::Result<Vec<opsrelay_core::types::FileRecord>> {
                Ok(Vec::new())
            }
        }

        let mut manager = WatchManager::new();
        assert!(!manager.is_running());

        manager.start(WatchContext {
            settings: settings(),
            db: WatchDb::open_in_memory().unwrap(),
            source: Box::new(EmptySource),
            sink: Box::new(RecordingSink::new()),
            interval_secs: 3600,
        });
        assert!(manager.is_running());

        manager.stop();
        tokio::task::yield_now().await;
        assert!(!manager.is_running());
    }
}
