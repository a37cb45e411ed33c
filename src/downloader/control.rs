//! Batch cancellation.

use tracing::info;

use super::WorkshopDownloader;

impl WorkshopDownloader {
    /// Cancel the in-flight batch, if any
    ///
    /// The cancellation is observed at the driver's output-read suspension
    /// point: the child process is killed forcefully (no cooperation from the
    /// tool required) and every item of the batch goes back to `Queued` for a
    /// future attempt — cancellation never marks anything `Failed`.
    ///
    /// Returns `true` when a batch was actually signalled.
    pub async fn cancel_batch(&self) -> bool {
        let active = self.batch_state.active.lock().await;
        match active.as_ref() {
            Some(token) => {
                info!("cancelling in-flight batch");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a batch is currently fetching or post-processing
    pub fn batch_in_progress(&self) -> bool {
        // The gate is held for the full duration of a batch
        self.batch_state.gate.try_lock().is_err()
    }
}
