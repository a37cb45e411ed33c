//! Database layer for workshop-dl
//!
//! Handles SQLite persistence for the download queue and the append-only
//! history of terminal outcomes. The queue survives process restarts; history
//! is never mutated once written.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`queue`] — Active queue CRUD and status transitions
//! - [`history`] — Append-only history of terminal outcomes
//! - [`state`] — Runtime state (clean-shutdown tracking)

use crate::types::{HistoryEntry, ItemId, ItemInfo, Status};
use sqlx::{FromRow, sqlite::SqlitePool};

mod history;
mod migrations;
mod queue;
mod state;

/// New item to be inserted into the queue
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    /// Workshop published-file id
    pub item_id: ItemId,
    /// Display title, if known at enqueue time
    pub title: Option<String>,
    /// Workshop page URL the item was selected from
    pub source_url: Option<String>,
    /// Required items this one depends on
    pub dependencies: Vec<ItemId>,
}

/// Queue record from database
#[derive(Debug, Clone, FromRow)]
pub struct QueueRow {
    /// Workshop published-file id
    pub item_id: ItemId,
    /// Display title, if known
    pub title: Option<String>,
    /// Workshop page URL, if known
    pub source_url: Option<String>,
    /// Current status (see [`Status`])
    pub status: i32,
    /// Error message from the last failed attempt
    pub error_message: Option<String>,
    /// JSON-encoded list of dependency ids
    pub dependencies: String,
    /// Unix timestamp when the item was enqueued
    pub created_at: i64,
    /// Unix timestamp when the last fetch attempt started
    pub started_at: Option<i64>,
    /// Unix timestamp when the item reached a terminal status
    pub finished_at: Option<i64>,
}

impl QueueRow {
    /// Decode the JSON dependency list
    ///
    /// A corrupted column decodes to an empty list rather than failing the
    /// whole read; the item itself can still be fetched.
    pub fn dependency_ids(&self) -> Vec<ItemId> {
        serde_json::from_str(&self.dependencies).unwrap_or_default()
    }
}

impl From<QueueRow> for ItemInfo {
    fn from(row: QueueRow) -> Self {
        use chrono::{TimeZone, Utc};

        let dependencies = row.dependency_ids();
        ItemInfo {
            id: row.item_id,
            title: row.title,
            source_url: row.source_url,
            status: Status::from_i32(row.status),
            error_message: row.error_message,
            dependencies,
            created_at: Utc
                .timestamp_opt(row.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            started_at: row
                .started_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            finished_at: row
                .finished_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }
    }
}

/// New history entry to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    /// Workshop published-file id
    pub item_id: ItemId,
    /// Display title, if known
    pub title: Option<String>,
    /// Terminal status code (Completed or Failed)
    pub status: i32,
    /// Error message for failed items
    pub error_message: Option<String>,
    /// Folder names created under the target directory
    pub folders: Vec<String>,
    /// Unix timestamp when the item reached its terminal status
    pub completed_at: i64,
}

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Workshop published-file id
    pub item_id: ItemId,
    /// Display title, if known
    pub title: Option<String>,
    /// Terminal status code
    pub status: i32,
    /// Error message for failed items
    pub error_message: Option<String>,
    /// JSON-encoded list of created folder names
    pub folders: String,
    /// Unix timestamp when the item reached its terminal status
    pub completed_at: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        use chrono::{TimeZone, Utc};

        HistoryEntry {
            id: row.id,
            item_id: row.item_id,
            title: row.title,
            status: Status::from_i32(row.status),
            error_message: row.error_message,
            folders: serde_json::from_str(&row.folders).unwrap_or_default(),
            completed_at: Utc
                .timestamp_opt(row.completed_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Database handle for workshop-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
