//! Append-only history of terminal outcomes.

use crate::error::DatabaseError;
use crate::types::{HistoryEntry, ItemId};
use crate::{Error, Result};

use super::{Database, HistoryRow, NewHistoryEntry};

impl Database {
    /// Append a terminal outcome to history
    ///
    /// Called when an item reaches `Completed` or `Failed`. The record is
    /// immutable once written; re-downloading the same item later produces a
    /// second record rather than updating this one.
    pub async fn record_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let folders = serde_json::to_string(&entry.folders)?;

        let result = sqlx::query(
            r#"
            INSERT INTO history (item_id, title, status, error_message, folders, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.item_id)
        .bind(&entry.title)
        .bind(entry.status)
        .bind(&entry.error_message)
        .bind(&folders)
        .bind(entry.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record history: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Query history with pagination and optional status filter
    ///
    /// Returns history entries ordered by completion time (most recent first).
    /// Use limit and offset for pagination.
    pub async fn query_history(
        &self,
        status_filter: Option<i32>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let query = if let Some(status) = status_filter {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, item_id, title, status, error_message, folders, completed_at
                FROM history
                WHERE status = ?
                ORDER BY completed_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(status)
            .bind(limit as i64)
            .bind(offset as i64)
        } else {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, item_id, title, status, error_message, folders, completed_at
                FROM history
                ORDER BY completed_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(limit as i64)
            .bind(offset as i64)
        };

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query history: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Count history entries (optionally filtered by status)
    pub async fn count_history(&self, status_filter: Option<i32>) -> Result<i64> {
        let count = if let Some(status) = status_filter {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history WHERE status = ?")
                .bind(status)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?
        } else {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?
        };

        Ok(count)
    }

    /// Whether an item has ever completed successfully
    pub async fn has_completed(&self, id: &ItemId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM history WHERE item_id = ? AND status = ?",
        )
        .bind(id)
        .bind(crate::types::Status::Completed.to_i32())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(count > 0)
    }

    /// Delete history entries older than the specified timestamp
    ///
    /// Returns the number of records deleted. Retention policy is the
    /// caller's concern; the core never prunes automatically.
    pub async fn delete_history_before(&self, before_timestamp: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM history WHERE completed_at < ?")
            .bind(before_timestamp)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}
