//! # workshop-dl
//!
//! Backend library for Steam Workshop download applications, built around the
//! external `steamcmd` tool: a persistent work queue, a process driver that
//! parses the tool's streaming output, a dependency-closure resolver, and a
//! post-processing pipeline that relocates payloads into the target mods
//! directory.
//!
//! ## Design Philosophy
//!
//! workshop-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Crash-safe** - Queue state is durable; interrupted items requeue on restart
//! - **Tool-delegating** - All Steam protocol work is steamcmd's job
//!
//! ## Quick Start
//!
//! ```no_run
//! use workshop_dl::{Config, NewItem, WorkshopDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         download: workshop_dl::config::DownloadConfig {
//!             target_dir: "/games/zomboid/mods".into(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let downloader = WorkshopDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Enqueue an item selected in the browser surface
//!     downloader
//!         .add_item(NewItem {
//!             id: "2392709985".to_string(),
//!             source_url: Some(
//!                 "https://steamcommunity.com/sharedfiles/filedetails/?id=2392709985".into(),
//!             ),
//!             title: Some("Better Sorting".to_string()),
//!             dependencies: vec![],
//!         })
//!         .await?;
//!
//!     // Drain the queue through one steamcmd batch
//!     let summary = downloader.download_queued().await?;
//!     println!("completed: {:?}", summary.completed);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Post-processing pipeline
pub mod post_processing;
/// Dependency resolution and closure expansion
pub mod resolver;
/// External fetch tool driver
pub mod steamcmd;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, LoginMode};
pub use db::Database;
pub use downloader::WorkshopDownloader;
pub use error::{DatabaseError, Error, FetchError, PostProcessError, QueueError, Result};
pub use resolver::{DependencyResolver, StoredMetadataResolver};
pub use steamcmd::{BatchDisposition, BatchReport, ItemOutcome, ProcessEvent, SteamCmd};
pub use types::{
    BatchSummary, Event, HistoryEntry, ItemId, ItemInfo, NewItem, QueueStats, Stage, Status,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's
/// `shutdown()` method, which cancels any in-flight batch (its items requeue
/// for the next session).
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use workshop_dl::{Config, WorkshopDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = WorkshopDownloader::new(Config::default()).await?;
///     downloader.start_queue_processor();
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: WorkshopDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
