//! The watch cycle — one scheduled execution of discover → dedup →
//! route → notify.
//!
//! Failure semantics: configuration problems log and skip (nothing to
//! report against), upstream failures write an error status, and
//! forwarding failures are recorded inline in the ok status. Once the
//! listing succeeds there is no path that leaves the status record
//! unwritten. Already-persisted history is never rolled back:
//! discovery is at-least-once, notification is best-effort.

use chrono::{DateTime, Utc};

use opsrelay_core::config::ForwardConfig;
use opsrelay_core::traits::{FileSource, NotifySink};
use opsrelay_core::types::{
    FileRecord, ForwardOutcome, ForwardSummary, HistoryEntry, LastCheck, RunState, WatchStatus,
};

use crate::chunk::{chunk_messages, format_entry};
use crate::flow;
use crate::store::WatchDb;

/// Stored error strings are clipped so verbose upstream error bodies
/// cannot grow the status record without bound.
pub(crate) const MAX_ERROR_LEN: usize = 500;

pub(crate) fn clip(s: &str) -> String {
    s.chars().take(MAX_ERROR_LEN).collect()
}

/// Per-watcher cycle settings, resolved from configuration once at
/// startup.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub watcher_id: String,
    pub folder_id: String,
    /// Optional lower bound on file creation time for listings.
    pub since: Option<DateTime<Utc>>,
    /// Static forwarding used when no routing flow is stored.
    pub fallback: ForwardConfig,
}

/// How a cycle ended, for logging and the `once` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Configuration incomplete; nothing ran and no status was written.
    Skipped(&'static str),
    /// Upstream failure; an error status was written.
    Errored(String),
    /// Normal completion; an ok status was written.
    Completed { new_files: usize, total: usize },
}

/// Run one watch cycle. Never panics and never propagates external-call
/// failures to the caller.
pub async fn run_cycle(
    settings: &CycleSettings,
    source: &dyn FileSource,
    sink: &dyn NotifySink,
    db: &mut WatchDb,
) -> CycleOutcome {
    if settings.folder_id.trim().is_empty() {
        tracing::warn!("Watch cycle skipped: no folder id configured");
        return CycleOutcome::Skipped("missing folder id");
    }

    let now = Utc::now();

    // Authenticate + list. Failures end the cycle with an error status.
    let files = match source.list_pdfs(&settings.folder_id, settings.since).await {
        Ok(files) => files,
        Err(e) => return errored(settings, db, now, &e.to_string()),
    };

    let known = match db.existing_ids() {
        Ok(known) => known,
        Err(e) => return errored(settings, db, now, &e.to_string()),
    };

    // Source order (newest first) is preserved through the diff.
    let new_files: Vec<FileRecord> = files
        .iter()
        .filter(|f| !known.contains(&f.id))
        .cloned()
        .collect();

    if !new_files.is_empty() {
        let entries: Vec<HistoryEntry> = new_files
            .iter()
            .map(|f| HistoryEntry::from_file(f, now))
            .collect();
        if let Err(e) = db.put_many(&entries) {
            return errored(settings, db, now, &e.to_string());
        }
        tracing::info!(
            "📄 {} new PDF(s) discovered in folder {}",
            new_files.len(),
            settings.folder_id
        );
    }

    // Forwarding failures are recorded, never propagated: persisted
    // history stands and the ok status is still written.
    let forward = if new_files.is_empty() {
        None
    } else {
        Some(forward_files(db, settings, &new_files, sink).await)
    };

    let new_ids: Vec<String> = new_files.iter().map(|f| f.id.clone()).collect();
    let status = WatchStatus {
        last_run: Some(now),
        status: Some(RunState::Ok),
        error: None,
        new_files_found: Some(new_files.len()),
        total_in_folder: Some(files.len()),
        last_found_file_ids: Some(new_ids.clone()),
        last_check_with_files: (!new_files.is_empty()).then(|| LastCheck {
            run_at: now,
            file_ids: new_ids,
        }),
        forward,
    };
    if let Err(e) = db.merge_status(&settings.watcher_id, &status) {
        tracing::warn!("⚠️ Failed to write watch status: {e}");
    }

    CycleOutcome::Completed {
        new_files: new_files.len(),
        total: files.len(),
    }
}

fn errored(
    settings: &CycleSettings,
    db: &mut WatchDb,
    now: DateTime<Utc>,
    message: &str,
) -> CycleOutcome {
    let message = clip(message);
    tracing::error!("Watch cycle failed: {message}");
    let status = WatchStatus {
        last_run: Some(now),
        status: Some(RunState::Error),
        error: Some(message.clone()),
        new_files_found: Some(0),
        ..Default::default()
    };
    if let Err(e) = db.merge_status(&settings.watcher_id, &status) {
        tracing::warn!("⚠️ Failed to write error status: {e}");
    }
    CycleOutcome::Errored(message)
}

/// Forward a batch through the stored routing flow, or the static
/// fallback when none is configured. All failures are captured in the
/// returned summary.
pub(crate) async fn forward_files(
    db: &WatchDb,
    settings: &CycleSettings,
    files: &[FileRecord],
    sink: &dyn NotifySink,
) -> ForwardSummary {
    let flow = match db.load_flow(&settings.watcher_id) {
        Ok(flow) => flow,
        Err(e) => {
            tracing::warn!("Failed to load routing flow, using fallback: {e}");
            None
        }
    };

    match flow {
        Some(flow) => {
            let report = flow::evaluate(&flow, files, sink).await;
            ForwardSummary {
                ok: report.ok,
                reason: report.reason,
                error: None,
                results: report.results,
            }
        }
        None => fallback_forward(&settings.fallback, files, sink).await,
    }
}

async fn fallback_forward(
    fallback: &ForwardConfig,
    files: &[FileRecord],
    sink: &dyn NotifySink,
) -> ForwardSummary {
    if !fallback.enabled {
        return ForwardSummary {
            ok: true,
            reason: Some("disabled".into()),
            ..Default::default()
        };
    }
    let recipient = fallback.recipient_id.trim();
    if recipient.is_empty() {
        return ForwardSummary {
            ok: false,
            reason: Some("missing_recipient".into()),
            ..Default::default()
        };
    }

    let entries: Vec<String> = files.iter().map(format_entry).collect();
    for text in chunk_messages(&fallback.header, &entries) {
        if let Err(e) = sink.send(recipient, &text).await {
            tracing::warn!("Fallback forward to {recipient} failed: {e}");
            return ForwardSummary {
                ok: false,
                reason: Some("send_failed".into()),
                error: Some(clip(&e.to_string())),
                results: Vec::new(),
            };
        }
    }
    ForwardSummary {
        ok: true,
        reason: None,
        error: None,
        results: vec![ForwardOutcome::sent(recipient, files.len())],
    }
}
