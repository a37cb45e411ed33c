//! Active queue CRUD and status transitions.

use crate::error::{DatabaseError, QueueError};
use crate::types::{ItemId, QueueStats, Status};
use crate::{Error, Result};

use super::{Database, NewQueueItem, QueueRow};

impl Database {
    /// Insert a new item into the queue
    ///
    /// Fails with [`QueueError::DuplicateItem`] if the identifier is already
    /// active (non-terminal) in the queue — the uniqueness invariant. An id
    /// whose row is terminal (completed or failed, not yet cleared) is
    /// explicitly re-queued as a fresh entry instead; ids present only in
    /// history behave the same way.
    pub async fn enqueue(&self, item: &NewQueueItem) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let dependencies = serde_json::to_string(&item.dependencies)?;

        let result = sqlx::query(
            r#"
            INSERT INTO queue (item_id, title, source_url, status, dependencies, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.item_id)
        .bind(&item.title)
        .bind(&item.source_url)
        .bind(Status::Queued.to_i32())
        .bind(&dependencies)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => self.requeue_terminal(item, now).await,
            Err(e) => Err(Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to enqueue item: {}",
                e
            )))),
        }
    }

    /// Turn a terminal row back into a fresh queued entry (re-download)
    ///
    /// Active rows stay untouched and surface as duplicates.
    async fn requeue_terminal(&self, item: &NewQueueItem, now: i64) -> Result<()> {
        let existing = self
            .get_item(&item.item_id)
            .await?
            .ok_or_else(|| QueueError::UnknownItem {
                id: item.item_id.clone(),
            })?;

        if !Status::from_i32(existing.status).is_terminal() {
            return Err(Error::Queue(QueueError::DuplicateItem {
                id: item.item_id.clone(),
            }));
        }

        let dependencies = serde_json::to_string(&item.dependencies)?;
        sqlx::query(
            r#"
            UPDATE queue
            SET title = ?, source_url = ?, status = ?, error_message = NULL,
                dependencies = ?, created_at = ?, started_at = NULL, finished_at = NULL
            WHERE item_id = ?
            "#,
        )
        .bind(&item.title)
        .bind(&item.source_url)
        .bind(Status::Queued.to_i32())
        .bind(&dependencies)
        .bind(now)
        .bind(&item.item_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to re-queue terminal item: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Insert dependency items discovered during closure expansion
    ///
    /// Ids already present in the queue are left untouched, so an expansion
    /// can never duplicate or reset an existing entry.
    pub async fn ensure_queued(&self, items: &[NewQueueItem]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        for item in items {
            let dependencies = serde_json::to_string(&item.dependencies)?;
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO queue
                    (item_id, title, source_url, status, dependencies, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.item_id)
            .bind(&item.title)
            .bind(&item.source_url)
            .bind(Status::Queued.to_i32())
            .bind(&dependencies)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert dependency item: {}",
                    e
                )))
            })?;
        }

        Ok(())
    }

    /// Get a queue item by id
    pub async fn get_item(&self, id: &ItemId) -> Result<Option<QueueRow>> {
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT item_id, title, source_url, status, error_message,
                   dependencies, created_at, started_at, finished_at
            FROM queue
            WHERE item_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get queue item: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all queue items in FIFO order
    pub async fn list_items(&self) -> Result<Vec<QueueRow>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT item_id, title, source_url, status, error_message,
                   dependencies, created_at, started_at, finished_at
            FROM queue
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list queue items: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Snapshot of the pending (Queued) items in FIFO order
    ///
    /// Read-only: the snapshot does not mutate queue state.
    pub async fn pending_items(&self) -> Result<Vec<QueueRow>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT item_id, title, source_url, status, error_message,
                   dependencies, created_at, started_at, finished_at
            FROM queue
            WHERE status = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(Status::Queued.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list pending items: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Remove an item from the queue
    ///
    /// Only `Queued` items can be removed; an item that is fetching or
    /// processing fails with [`QueueError::InvalidState`], and an absent id
    /// with [`QueueError::UnknownItem`].
    pub async fn remove(&self, id: &ItemId) -> Result<()> {
        let row = self
            .get_item(id)
            .await?
            .ok_or_else(|| QueueError::UnknownItem { id: id.clone() })?;

        let status = Status::from_i32(row.status);
        if status != Status::Queued {
            return Err(Error::Queue(QueueError::InvalidState {
                id: id.clone(),
                operation: "remove".to_string(),
                current_state: format!("{:?}", status),
            }));
        }

        sqlx::query("DELETE FROM queue WHERE item_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to remove queue item: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Transition an item's status, stamping timestamps as appropriate
    ///
    /// `started_at` is stamped when entering `Fetching`; `finished_at` when
    /// entering a terminal status. The error message is stored for failures
    /// and cleared otherwise. Fails with [`QueueError::UnknownItem`] if the
    /// id is absent.
    pub async fn mark_status(
        &self,
        id: &ItemId,
        status: Status,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let query = match status {
            Status::Fetching => sqlx::query(
                "UPDATE queue SET status = ?, error_message = ?, started_at = ? WHERE item_id = ?",
            )
            .bind(status.to_i32())
            .bind(error)
            .bind(now)
            .bind(id),
            Status::Completed | Status::Failed => sqlx::query(
                "UPDATE queue SET status = ?, error_message = ?, finished_at = ? WHERE item_id = ?",
            )
            .bind(status.to_i32())
            .bind(error)
            .bind(now)
            .bind(id),
            Status::Queued => sqlx::query(
                "UPDATE queue SET status = ?, error_message = ?, started_at = NULL, finished_at = NULL WHERE item_id = ?",
            )
            .bind(status.to_i32())
            .bind(error)
            .bind(id),
            Status::Processing => {
                sqlx::query("UPDATE queue SET status = ?, error_message = ? WHERE item_id = ?")
                    .bind(status.to_i32())
                    .bind(error)
                    .bind(id)
            }
        };

        let result = query.execute(&self.pool).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update item status: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Queue(QueueError::UnknownItem { id: id.clone() }));
        }

        Ok(())
    }

    /// Return a set of items to `Queued` for a future attempt
    ///
    /// Used after batch-level failures and cancellation. Ids no longer in the
    /// queue are skipped silently.
    pub async fn requeue(&self, ids: &[ItemId]) -> Result<()> {
        for id in ids {
            sqlx::query(
                "UPDATE queue SET status = ?, error_message = NULL, started_at = NULL, finished_at = NULL WHERE item_id = ?",
            )
            .bind(Status::Queued.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to requeue item: {}",
                    e
                )))
            })?;
        }

        Ok(())
    }

    /// Reset items interrupted by a crash back to `Queued`
    ///
    /// Items left in `Fetching` or `Processing` from a previous session can
    /// never make progress; they are requeued on startup. Returns the ids
    /// that were reset.
    pub async fn reset_interrupted(&self) -> Result<Vec<ItemId>> {
        let interrupted: Vec<ItemId> = sqlx::query_scalar(
            "SELECT item_id FROM queue WHERE status = ? OR status = ? ORDER BY created_at ASC",
        )
        .bind(Status::Fetching.to_i32())
        .bind(Status::Processing.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query interrupted items: {}",
                e
            )))
        })?;

        if !interrupted.is_empty() {
            self.requeue(&interrupted).await?;
        }

        Ok(interrupted)
    }

    /// Delete completed entries from the queue (auto-clear)
    ///
    /// Returns the number of rows removed. History is unaffected.
    pub async fn clear_completed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue WHERE status = ?")
            .bind(Status::Completed.to_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear completed items: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// Delete all pending (Queued) entries
    ///
    /// In-flight items are left untouched. Returns the number of rows removed.
    pub async fn clear_queued(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue WHERE status = ?")
            .bind(Status::Queued.to_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear queue: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// Per-status counts over the queue store
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let rows: Vec<(i32, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM queue GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to compute queue stats: {}",
                        e
                    )))
                })?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as usize;
            stats.total += count;
            match Status::from_i32(status) {
                Status::Queued => stats.queued += count,
                Status::Fetching => stats.fetching += count,
                Status::Processing => stats.processing += count,
                Status::Completed => stats.completed += count,
                Status::Failed => stats.failed += count,
            }
        }

        Ok(stats)
    }
}

/// Whether an sqlx error is a UNIQUE/PRIMARY KEY violation
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
