//! Pipeline data model.
//!
//! Field names serialize in camelCase so records round-trip against the
//! wire shapes used by the file source and the stored status documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file discovered in the watched folder. Identity is `id`; a record is
/// immutable once discovered and written to history exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub web_view_link: String,
    /// Byte size as reported upstream (string on the wire).
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Persisted marker that a file has been discovered. Keyed by `file_id`;
/// presence means "already forwarded, or at least already considered".
/// Never mutated or deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub file_id: String,
    pub name: String,
    #[serde(default)]
    pub web_view_link: String,
    pub discovered_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub mime_type: String,
}

impl HistoryEntry {
    pub fn from_file(file: &FileRecord, saved_at: DateTime<Utc>) -> Self {
        Self {
            file_id: file.id.clone(),
            name: file.name.clone(),
            web_view_link: file.web_view_link.clone(),
            discovered_at: file.created_time,
            saved_at,
            size: file.size.clone(),
            mime_type: file.mime_type.clone(),
        }
    }

    /// Reconstruct a file record for replaying through the forwarding path.
    pub fn to_file(&self) -> FileRecord {
        FileRecord {
            id: self.file_id.clone(),
            name: self.name.clone(),
            created_time: self.discovered_at,
            web_view_link: self.web_view_link.clone(),
            size: self.size.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Cycle result state stored in the status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Ok,
    Error,
}

/// The single overwritten status record per watcher.
///
/// Writes go through shallow-merge semantics: fields left `None` in a
/// partial update never erase what is already stored, which is how
/// `last_check_with_files` survives empty cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_files_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_in_folder: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_found_file_ids: Option<Vec<String>>,
    /// Only updated on cycles that found files, so "what was the last
    /// non-empty batch" stays answerable after any number of empty runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_with_files: Option<LastCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardSummary>,
}

/// Snapshot of the most recent cycle that discovered files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCheck {
    pub run_at: DateTime<Utc>,
    pub file_ids: Vec<String>,
}

/// Overall outcome of one forwarding attempt (flow or fallback).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardSummary {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ForwardOutcome>,
}

/// Per-action-node outcome recorded during flow evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_sent: Option<usize>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ForwardOutcome {
    pub fn sent(recipient_id: &str, files_sent: usize) -> Self {
        Self {
            ok: true,
            recipient_id: Some(recipient_id.to_string()),
            files_sent: Some(files_sent),
            skipped: false,
            reason: None,
            error: None,
        }
    }

    pub fn skipped(recipient_id: &str, reason: &str) -> Self {
        Self {
            ok: true,
            recipient_id: Some(recipient_id.to_string()),
            files_sent: None,
            skipped: true,
            reason: Some(reason.to_string()),
            error: None,
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            ok: false,
            recipient_id: None,
            files_sent: None,
            skipped: false,
            reason: Some(reason.to_string()),
            error: None,
        }
    }

    pub fn send_error(recipient_id: &str, error: String) -> Self {
        Self {
            ok: false,
            recipient_id: Some(recipient_id.to_string()),
            files_sent: None,
            skipped: false,
            reason: Some("send_failed".to_string()),
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_camel_case() {
        let json = r#"{
            "id": "f1",
            "name": "menu.pdf",
            "createdTime": "2026-05-01T10:00:00Z",
            "webViewLink": "https://example.com/f1",
            "size": "1024",
            "mimeType": "application/pdf"
        }"#;
        let file: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, "f1");
        assert_eq!(file.web_view_link, "https://example.com/f1");
        assert_eq!(file.mime_type, "application/pdf");
    }

    #[test]
    fn test_file_record_optional_fields_default() {
        let json = r#"{"id": "f2", "name": "a.pdf", "createdTime": "2026-05-01T10:00:00Z"}"#;
        let file: FileRecord = serde_json::from_str(json).unwrap();
        assert!(file.web_view_link.is_empty());
        assert!(file.size.is_empty());
    }

    #[test]
    fn test_history_round_trip() {
        let file: FileRecord = serde_json::from_str(
            r#"{"id": "f3", "name": "b.pdf", "createdTime": "2026-05-01T10:00:00Z",
                "webViewLink": "https://example.com/f3", "size": "9", "mimeType": "application/pdf"}"#,
        )
        .unwrap();
        let entry = HistoryEntry::from_file(&file, Utc::now());
        assert_eq!(entry.file_id, "f3");
        assert_eq!(entry.to_file(), FileRecord { ..file });
    }

    #[test]
    fn test_status_partial_serialization_drops_absent_fields() {
        let status = WatchStatus {
            status: Some(RunState::Ok),
            new_files_found: Some(0),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("status"));
        assert!(!obj.contains_key("lastCheckWithFiles"));
        assert!(!obj.contains_key("forward"));
        assert_eq!(value["status"], "ok");
    }
}
