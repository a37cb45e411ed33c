//! Queue processor — the continuous drain loop.

use crate::error::Error;

use super::WorkshopDownloader;

impl WorkshopDownloader {
    /// Start the queue processor task
    ///
    /// Spawns a background task that repeatedly runs
    /// [`download_queued`](Self::download_queued) while items are pending and
    /// sleeps for the configured poll interval when the queue is idle. Newly
    /// enqueued items are picked up on the next iteration; batch-level
    /// failures are logged and the loop continues (their items were already
    /// requeued).
    ///
    /// The task ends once shutdown stops accepting new items. Explicit
    /// triggering via `download_queued()` remains possible when the processor
    /// is not running; the batch gate serializes the two.
    pub fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();

        tokio::spawn(async move {
            loop {
                if !downloader
                    .accepting_new
                    .load(std::sync::atomic::Ordering::SeqCst)
                {
                    tracing::debug!("queue processor stopping (shutdown)");
                    break;
                }

                match downloader.download_queued().await {
                    // Something was processed; check again immediately in
                    // case items were enqueued during the batch
                    Ok(summary) if !summary.is_empty() => continue,
                    // Queue empty
                    Ok(_) => {}
                    // An explicit trigger holds the gate; back off
                    Err(Error::BatchInProgress) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "batch failed, items requeued");
                    }
                }

                tokio::time::sleep(downloader.config.queue_poll_interval()).await;
            }
        })
    }
}
