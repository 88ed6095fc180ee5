//! SQLite-backed persistence for the watch pipeline.
//!
//! Three tables: `history` (one immutable row per discovered file),
//! `watch_status` (one merged JSON record per watcher), and `flows`
//! (one JSON routing flow per watcher). History writes are a single
//! transaction with `INSERT OR IGNORE`, so overlapping cycles racing on
//! the same batch cannot error or duplicate rows.

use chrono::{DateTime, Utc};
use rusqlite::params;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use opsrelay_core::error::{RelayError, Result};
use opsrelay_core::types::{HistoryEntry, WatchStatus};

use crate::flow::Flow;

/// Persistence store for history, status, and routing flows.
pub struct WatchDb {
    conn: Mutex<rusqlite::Connection>,
}

fn store_err(e: rusqlite::Error) -> RelayError {
    RelayError::Store(e.to_string())
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl WatchDb {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(store_err)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(store_err)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS history (
                file_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                web_view_link TEXT NOT NULL DEFAULT '',
                discovered_at TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                size TEXT NOT NULL DEFAULT '',
                mime_type TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS watch_status (
                watcher_id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS flows (
                watcher_id TEXT PRIMARY KEY,
                flow TEXT NOT NULL
            );
        ",
            )
            .map_err(store_err)
    }

    // ─── History ──────────────────────────────────────────────

    /// All known file ids. Existence-only projection: dedup never needs
    /// full rows.
    pub fn existing_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT file_id FROM history")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .map_err(store_err)?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row.map_err(store_err)?);
        }
        Ok(ids)
    }

    /// Persist a batch of history entries in one transaction.
    /// Re-inserting an existing id is a no-op, never an error.
    pub fn put_many(&mut self, entries: &[HistoryEntry]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(store_err)?;
        for entry in entries {
            tx.execute(
                "INSERT OR IGNORE INTO history
                 (file_id, name, web_view_link, discovered_at, saved_at, size, mime_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.file_id,
                    entry.name,
                    entry.web_view_link,
                    entry.discovered_at.to_rfc3339(),
                    entry.saved_at.to_rfc3339(),
                    entry.size,
                    entry.mime_type,
                ],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    /// The `n` most recently saved entries, newest first.
    pub fn recent_entries(&self, n: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT file_id, name, web_view_link, discovered_at, saved_at, size, mime_type
                 FROM history ORDER BY saved_at DESC, rowid DESC LIMIT ?1",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([n as i64], row_to_entry)
            .map_err(store_err)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(store_err)?);
        }
        Ok(entries)
    }

    /// Entries for the given ids, in the given order. Unknown ids are
    /// silently absent.
    pub fn entries_by_ids(&self, ids: &[String]) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT file_id, name, web_view_link, discovered_at, saved_at, size, mime_type
                 FROM history WHERE file_id = ?1",
            )
            .map_err(store_err)?;
        let mut entries = Vec::new();
        for id in ids {
            let mut rows = stmt.query_map([id], row_to_entry).map_err(store_err)?;
            if let Some(row) = rows.next() {
                entries.push(row.map_err(store_err)?);
            }
        }
        Ok(entries)
    }

    // ─── Status ───────────────────────────────────────────────

    /// Load the status record for a watcher, if any.
    pub fn load_status(&self, watcher_id: &str) -> Result<Option<WatchStatus>> {
        let record: Option<String> = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT record FROM watch_status WHERE watcher_id = ?1",
                [watcher_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err(other)),
            })?;
        match record {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| RelayError::Store(format!("Corrupt status record: {e}"))),
            None => Ok(None),
        }
    }

    /// Shallow-merge a partial status into the stored record. Top-level
    /// keys absent from `partial` keep their stored values.
    pub fn merge_status(&self, watcher_id: &str, partial: &WatchStatus) -> Result<()> {
        let existing: serde_json::Value = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT record FROM watch_status WHERE watcher_id = ?1",
                [watcher_id],
                |r| r.get::<_, String>(0),
            )
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| serde_json::json!({}));

        let patch = serde_json::to_value(partial)
            .map_err(|e| RelayError::Store(format!("Serialize status: {e}")))?;
        let merged = shallow_merge(existing, patch);

        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT OR REPLACE INTO watch_status (watcher_id, record) VALUES (?1, ?2)",
                params![watcher_id, merged.to_string()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    // ─── Flows ────────────────────────────────────────────────

    /// Load the routing flow for a watcher, if one is configured.
    pub fn load_flow(&self, watcher_id: &str) -> Result<Option<Flow>> {
        let json: Option<String> = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT flow FROM flows WHERE watcher_id = ?1",
                [watcher_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err(other)),
            })?;
        match json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| RelayError::Store(format!("Corrupt flow: {e}"))),
            None => Ok(None),
        }
    }

    /// Store (replace) the routing flow for a watcher.
    pub fn save_flow(&self, watcher_id: &str, flow: &Flow) -> Result<()> {
        let json = serde_json::to_string(flow)
            .map_err(|e| RelayError::Store(format!("Serialize flow: {e}")))?;
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT OR REPLACE INTO flows (watcher_id, flow) VALUES (?1, ?2)",
                params![watcher_id, json],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        file_id: row.get(0)?,
        name: row.get(1)?,
        web_view_link: row.get(2)?,
        discovered_at: parse_ts(&row.get::<_, String>(3)?),
        saved_at: parse_ts(&row.get::<_, String>(4)?),
        size: row.get(5)?,
        mime_type: row.get(6)?,
    })
}

/// Merge top-level object keys of `patch` over `base`.
fn shallow_merge(mut base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (&mut base, patch) {
        (serde_json::Value::Object(b), serde_json::Value::Object(p)) => {
            for (k, v) in p {
                b.insert(k, v);
            }
            base
        }
        (_, p) => p,
    }
}
