//! Core downloader implementation split into focused submodules.
//!
//! The `WorkshopDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Queue management (add/remove/clear, read models)
//! - [`batch`] - Batch execution state machine
//! - [`control`] - Batch cancellation
//! - [`processor`] - Continuous queue drain loop
//! - [`lifecycle`] - Startup recovery and shutdown coordination

mod batch;
mod control;
mod lifecycle;
mod processor;
mod queue;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::post_processing::PostProcessor;
use crate::resolver::{DependencyResolver, StoredMetadataResolver};

/// Batch serialization state
///
/// At most one batch may be fetching or post-processing at a time; two
/// processes racing over the same scratch and target directories would
/// corrupt both. The gate mutex is held for the duration of a batch and
/// try-locked by new triggers.
#[derive(Clone)]
pub(crate) struct BatchState {
    /// Held while a batch runs; try-locked to enforce single flight
    pub(crate) gate: std::sync::Arc<tokio::sync::Mutex<()>>,
    /// Cancellation token of the in-flight batch, if any
    pub(crate) active:
        std::sync::Arc<tokio::sync::Mutex<Option<tokio_util::sync::CancellationToken>>>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct WorkshopDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query item status
    pub db: std::sync::Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<crate::types::Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Dependency metadata source for closure expansion
    pub(crate) resolver: std::sync::Arc<dyn DependencyResolver>,
    /// Payload relocation and scratch cleanup executor
    pub(crate) post_processor: std::sync::Arc<PostProcessor>,
    /// Batch serialization state
    pub(crate) batch_state: BatchState,
    /// Flag to indicate whether new items are accepted (false during shutdown)
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl WorkshopDownloader {
    /// Create a new WorkshopDownloader instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration and creates the staging/target directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Requeues items interrupted by a previous crash
    /// - Sets up the event broadcast channel
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        // Ensure target and staging directories exist
        tokio::fs::create_dir_all(&config.download.target_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create target directory '{}': {}",
                        config.download.target_dir.display(),
                        e
                    ),
                ))
            })?;
        tokio::fs::create_dir_all(&config.download.staging_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create staging directory '{}': {}",
                        config.download.staging_dir.display(),
                        e
                    ),
                ))
            })?;

        // Initialize database
        let db = Database::new(&config.persistence.database_path).await?;

        // Items left mid-flight by a crash can never progress; requeue them
        // before anything else observes the queue.
        let was_clean = db.was_clean_shutdown().await?;
        let restored = db.reset_interrupted().await?;
        if !restored.is_empty() {
            tracing::info!(
                count = restored.len(),
                was_clean_shutdown = was_clean,
                "requeued items interrupted by previous session"
            );
        }

        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;

        // Create broadcast channel with buffer size of 1024 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1024);

        let config_arc = std::sync::Arc::new(config);
        let db_arc = std::sync::Arc::new(db);

        // Default resolver reads the dependency metadata stored with each
        // queue entry (collected from the item's Workshop page at enqueue)
        let resolver: std::sync::Arc<dyn DependencyResolver> =
            std::sync::Arc::new(StoredMetadataResolver::new(db_arc.clone()));

        let post_processor = std::sync::Arc::new(PostProcessor::new(
            event_tx.clone(),
            config_arc.clone(),
        ));

        let batch_state = BatchState {
            gate: std::sync::Arc::new(tokio::sync::Mutex::new(())),
            active: std::sync::Arc::new(tokio::sync::Mutex::new(None)),
        };

        Ok(Self {
            db: db_arc,
            event_tx,
            config: config_arc,
            resolver,
            post_processor,
            batch_state,
            accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently. Events are buffered, but if a subscriber falls behind by
    /// more than 1024 events, it will receive a `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::types::Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone.
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped
    /// (ok() converts Err to None). Downloads proceed whether or not anyone
    /// is listening.
    pub(crate) fn emit_event(&self, event: crate::types::Event) {
        self.event_tx.send(event).ok();
    }
}
