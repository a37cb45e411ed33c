//! Batch execution — the orchestration state machine.
//!
//! One call to [`WorkshopDownloader::download_queued`] drives a full cycle:
//! snapshot the queue, expand the dependency closure, invoke the fetch tool,
//! relocate successful payloads, and record terminal outcomes. The state
//! progression is `Idle → ResolvingDependencies → Fetching → PostProcessing
//! → Idle`, with early returns to `Idle` on batch-level failure or
//! cancellation (items requeued, never failed).

use crate::db::{NewHistoryEntry, NewQueueItem};
use crate::error::{Error, FetchError, Result};
use crate::resolver::expand_closure;
use crate::steamcmd::{BatchDisposition, ItemOutcome, ProcessEvent, SteamCmd};
use crate::types::{BatchSummary, Event, ItemId, Stage, Status};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::WorkshopDownloader;

impl WorkshopDownloader {
    /// Run one batch end-to-end
    ///
    /// Returns an empty summary when the queue has nothing pending. Fails
    /// with [`Error::BatchInProgress`] if another batch is already fetching
    /// or post-processing; with a configuration error if the tool path or
    /// directories are unusable (no batch is attempted); and with a fetch
    /// error after a batch-level failure (launch, login, stall, abnormal
    /// exit), in which case every member has been requeued untouched.
    pub async fn download_queued(&self) -> Result<BatchSummary> {
        // Single-flight: at most one batch may be fetching or post-processing
        let gate = self.batch_state.gate.clone();
        let _guard = gate.try_lock().map_err(|_| Error::BatchInProgress)?;

        // Config problems surface before any queue state changes
        let tool = SteamCmd::from_config(&self.config)?;

        let pending = self.db.pending_items().await?;
        if pending.is_empty() {
            debug!("queue empty, nothing to fetch");
            return Ok(BatchSummary::default());
        }

        // ResolvingDependencies: expand the snapshot into its closure
        let seeds: Vec<ItemId> = pending.iter().map(|row| row.item_id.clone()).collect();
        let batch_ids = expand_closure(self.resolver.as_ref(), &seeds).await;

        // Dependencies discovered beyond the snapshot become queue entries of
        // their own, so their outcomes are tracked like any other item's.
        let discovered: Vec<NewQueueItem> = batch_ids
            .iter()
            .filter(|id| !seeds.contains(id))
            .map(|id| NewQueueItem {
                item_id: id.clone(),
                title: None,
                source_url: None,
                dependencies: Vec::new(),
            })
            .collect();
        if !discovered.is_empty() {
            info!(count = discovered.len(), "dependency closure added items to the batch");
            self.db.ensure_queued(&discovered).await?;
        }

        // Register the cancellation token before anything is marked
        // Fetching, so a cancel arriving during setup is never missed
        let cancel = CancellationToken::new();
        *self.batch_state.active.lock().await = Some(cancel.clone());

        // Fetching
        for id in &batch_ids {
            self.db.mark_status(id, Status::Fetching, None).await?;
        }
        info!(batch_size = batch_ids.len(), "batch fetch starting");
        self.emit_event(Event::BatchStarted {
            items: batch_ids.clone(),
        });

        let mut running = match tool.run(batch_ids.clone(), cancel) {
            Ok(running) => running,
            Err(launch) => {
                // LaunchError: batch aborted, every member requeued untouched
                self.abort_batch(&batch_ids, &launch).await?;
                return Err(Error::Fetch(launch));
            }
        };

        // Stream events until the tool exits
        while let Some(event) = running.events.recv().await {
            self.forward_process_event(event);
        }

        let report = match running.report.await {
            Ok(report) => report,
            Err(e) => {
                let fetch_err = FetchError::AbnormalExit { code: None };
                error!(error = %e, "fetch driver task panicked");
                self.abort_batch(&batch_ids, &fetch_err).await?;
                return Err(Error::Fetch(fetch_err));
            }
        };

        *self.batch_state.active.lock().await = None;

        match report.disposition {
            BatchDisposition::Completed => {}
            BatchDisposition::Cancelled => {
                // Nothing in the batch is terminal yet; everything goes back
                // to Queued for a future attempt — never to Failed.
                self.db.requeue(&batch_ids).await?;
                info!(requeued = batch_ids.len(), "batch cancelled");
                self.emit_event(Event::BatchCancelled {
                    requeued: batch_ids.len(),
                });
                return Ok(BatchSummary {
                    requeued: batch_ids,
                    ..Default::default()
                });
            }
            BatchDisposition::LoginFailed(reason) => {
                let fetch_err = FetchError::LoginFailed(reason);
                self.abort_batch(&batch_ids, &fetch_err).await?;
                return Err(Error::Fetch(fetch_err));
            }
            BatchDisposition::Stalled(idle) => {
                let fetch_err = FetchError::Stalled { idle };
                self.abort_batch(&batch_ids, &fetch_err).await?;
                return Err(Error::Fetch(fetch_err));
            }
            BatchDisposition::AbnormalExit(code) => {
                let fetch_err = FetchError::AbnormalExit { code };
                self.abort_batch(&batch_ids, &fetch_err).await?;
                return Err(Error::Fetch(fetch_err));
            }
        }

        // Partition per-item outcomes
        let mut succeeded: Vec<ItemId> = Vec::new();
        let mut fetch_failed: Vec<(ItemId, String)> = Vec::new();
        let mut retriable: Vec<ItemId> = Vec::new();
        for (id, outcome) in report.outcomes {
            match outcome {
                ItemOutcome::Success => succeeded.push(id),
                ItemOutcome::Failed(reason) => fetch_failed.push((id, reason)),
                ItemOutcome::Retry => retriable.push(id),
                // Never confirmed by the stream — failed for safety
                ItemOutcome::Unknown => {
                    fetch_failed.push((id, "never reported by the fetch tool".to_string()))
                }
            }
        }

        // PostProcessing: only ids the tool confirmed
        for id in &succeeded {
            self.db.mark_status(id, Status::Processing, None).await?;
        }
        let relocations = self.post_processor.process_batch(&succeeded).await;

        // Terminal bookkeeping: statuses, history, summary
        let mut summary = BatchSummary::default();

        for (id, result) in relocations {
            match result {
                Ok(folders) => {
                    self.record_terminal(&id, Status::Completed, None, folders)
                        .await?;
                    self.emit_event(Event::Completed { id: id.clone() });
                    summary.completed.push(id);
                }
                Err(e) => {
                    let message = e.to_string();
                    self.record_terminal(&id, Status::Failed, Some(&message), Vec::new())
                        .await?;
                    self.emit_event(Event::Failed {
                        id: id.clone(),
                        stage: Stage::Relocate,
                        error: message.clone(),
                    });
                    summary.failed.push((id, message));
                }
            }
        }

        for (id, reason) in fetch_failed {
            self.record_terminal(&id, Status::Failed, Some(&reason), Vec::new())
                .await?;
            self.emit_event(Event::Failed {
                id: id.clone(),
                stage: Stage::Fetch,
                error: reason.clone(),
            });
            summary.failed.push((id, reason));
        }

        for id in retriable {
            self.db.requeue(std::slice::from_ref(&id)).await?;
            self.emit_event(Event::Requeued { id: id.clone() });
            summary.requeued.push(id);
        }

        if self.config.download.auto_clear_queue && !summary.completed.is_empty() {
            let cleared = self.db.clear_completed().await?;
            debug!(cleared, "auto-cleared completed entries");
        }

        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            requeued = summary.requeued.len(),
            "batch finished"
        );
        self.emit_event(Event::BatchFinished {
            completed: summary.completed.len(),
            failed: summary.failed.len(),
        });

        Ok(summary)
    }

    /// Re-emit a driver event as a public status event
    fn forward_process_event(&self, event: ProcessEvent) {
        match event {
            ProcessEvent::LoginOk => self.emit_event(Event::LoginSucceeded),
            // The terminal report is authoritative for login failures
            ProcessEvent::LoginFailed(reason) => {
                warn!(reason = %reason, "fetch tool reported login failure");
            }
            ProcessEvent::ItemStart(id) => self.emit_event(Event::Fetching { id }),
            ProcessEvent::ItemSuccess(id) => self.emit_event(Event::ItemFetched { id }),
            ProcessEvent::ItemFailed { id, reason } => {
                self.emit_event(Event::ItemFetchFailed { id, reason })
            }
            ProcessEvent::RateLimited { id } => {
                warn!(item_id = ?id, "remote repository rate limit hit");
                self.emit_event(Event::RateLimited { id });
            }
            ProcessEvent::Unrecognized(line) => {
                debug!(line = %line, "unclassified fetch tool output");
                self.emit_event(Event::ToolOutput { line });
            }
        }
    }

    /// Abort a batch: requeue every member untouched and surface one
    /// aggregated failure event
    async fn abort_batch(&self, batch_ids: &[ItemId], cause: &FetchError) -> Result<()> {
        *self.batch_state.active.lock().await = None;
        self.db.requeue(batch_ids).await?;

        error!(error = %cause, requeued = batch_ids.len(), "batch aborted");
        self.emit_event(Event::BatchFailed {
            error: cause.to_string(),
            requeued: batch_ids.len(),
        });

        Ok(())
    }

    /// Record a terminal outcome: queue status plus an append-only history
    /// record carrying the item's title and the folders it produced
    async fn record_terminal(
        &self,
        id: &ItemId,
        status: Status,
        error: Option<&str>,
        folders: Vec<String>,
    ) -> Result<()> {
        self.db.mark_status(id, status, error).await?;

        let title = self
            .db
            .get_item(id)
            .await?
            .and_then(|row| row.title);

        self.db
            .record_history(&NewHistoryEntry {
                item_id: id.clone(),
                title,
                status: status.to_i32(),
                error_message: error.map(String::from),
                folders,
                completed_at: chrono::Utc::now().timestamp(),
            })
            .await?;

        Ok(())
    }
}
