//! Queue management — enqueue, remove, clear, read models.

use crate::db::NewQueueItem;
use crate::error::{Error, Result};
use crate::types::{Event, HistoryEntry, ItemId, ItemInfo, NewItem, QueueStats, Status};

use super::WorkshopDownloader;

impl WorkshopDownloader {
    /// Add an item to the download queue
    ///
    /// The request comes from the selection surface: an id, the Workshop page
    /// URL it was selected from, an optional title, and any "Required Items"
    /// collected from the page. Fails with a duplicate error if the id is
    /// already active in the queue; an id only present in history is fine and
    /// gets a fresh entry (re-download).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidItemId`] if the id fails shape validation
    /// - [`Error::InvalidUrl`] if a source URL is given but does not parse
    /// - [`Error::Queue`] with `DuplicateItem` if the id is already queued
    /// - [`Error::ShuttingDown`] during shutdown
    pub async fn add_item(&self, item: NewItem) -> Result<ItemId> {
        if !self
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(Error::ShuttingDown);
        }

        let id = ItemId::new(item.id)?;

        if let Some(ref url) = item.source_url
            && url::Url::parse(url).is_err()
        {
            return Err(Error::InvalidUrl(url.clone()));
        }

        // Malformed dependency ids scraped from a page are a warning, never a
        // reason to reject the seed item.
        let mut dependencies = Vec::with_capacity(item.dependencies.len());
        for dep in item.dependencies {
            match ItemId::new(dep) {
                Ok(dep_id) => dependencies.push(dep_id),
                Err(e) => {
                    tracing::warn!(item_id = %id, error = %e, "skipping malformed dependency id");
                }
            }
        }

        self.db
            .enqueue(&NewQueueItem {
                item_id: id.clone(),
                title: item.title.clone(),
                source_url: item.source_url,
                dependencies,
            })
            .await?;

        tracing::info!(item_id = %id, title = ?item.title, "item enqueued");
        self.emit_event(Event::Queued {
            id: id.clone(),
            title: item.title,
        });

        Ok(id)
    }

    /// Remove an item from the queue
    ///
    /// Only `Queued` items can be removed; in-flight and terminal entries are
    /// rejected with an invalid-state error.
    pub async fn remove_item(&self, id: &ItemId) -> Result<()> {
        self.db.remove(id).await?;

        tracing::info!(item_id = %id, "item removed from queue");
        self.emit_event(Event::Removed { id: id.clone() });

        Ok(())
    }

    /// Remove all pending items from the queue
    ///
    /// In-flight items are untouched. Returns the number of entries removed.
    pub async fn clear_queue(&self) -> Result<u64> {
        let removed = self.db.clear_queued().await?;

        if removed > 0 {
            tracing::info!(removed, "queue cleared");
            self.emit_event(Event::QueueCleared);
        }

        Ok(removed)
    }

    /// Ordered read model of the queue (FIFO)
    pub async fn queue(&self) -> Result<Vec<ItemInfo>> {
        let rows = self.db.list_items().await?;
        Ok(rows.into_iter().map(ItemInfo::from).collect())
    }

    /// Read model of a single queue item
    pub async fn item(&self, id: &ItemId) -> Result<Option<ItemInfo>> {
        let row = self.db.get_item(id).await?;
        Ok(row.map(ItemInfo::from))
    }

    /// Per-status counts over the queue store
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.db.queue_stats().await
    }

    /// Paginated read model of past outcomes, most recent first
    pub async fn history(
        &self,
        status: Option<Status>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>> {
        self.db
            .query_history(status.map(|s| s.to_i32()), limit, offset)
            .await
    }

    /// Count of history records (optionally filtered by status)
    pub async fn history_count(&self, status: Option<Status>) -> Result<i64> {
        self.db.count_history(status.map(|s| s.to_i32())).await
    }
}
