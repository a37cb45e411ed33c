//! Startup recovery and shutdown coordination.

use crate::error::Result;
use crate::types::Event;

use super::WorkshopDownloader;

/// How long shutdown waits for an in-flight batch to wind down
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

impl WorkshopDownloader {
    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting new items (enqueue fails with `ShuttingDown`)
    /// 2. Cancels the in-flight batch, if any — its items requeue
    /// 3. Waits for the batch to wind down, bounded by a timeout
    /// 4. Marks a clean shutdown in the database
    ///
    /// The queue itself needs no extra persistence: every mutation was
    /// durable when it was acknowledged.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new items; the queue processor loop also exits
        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);

        // 2. Cancel any in-flight batch
        if self.cancel_batch().await {
            tracing::info!("Signalled cancellation to in-flight batch");
        }

        // 3. Wait for the batch gate to free up
        let wound_down = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            let _ = self.batch_state.gate.lock().await;
        })
        .await;
        if wound_down.is_err() {
            tracing::warn!("Timeout waiting for batch to wind down, proceeding with shutdown");
        }

        // 4. Mark clean shutdown in database
        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
            // Continue with shutdown even if this fails
        }

        self.emit_event(Event::Shutdown);

        self.db.close().await;
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
