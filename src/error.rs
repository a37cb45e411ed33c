//! Error types for workshop-dl
//!
//! Domain-specific error enums (queue, fetch, post-processing, database) plus
//! a top-level [`Error`] that everything converts into. Per-item errors never
//! abort a batch; batch-level errors (launch, login, stall) requeue every
//! member; persistence failures are the only class treated as fatal, since
//! silently losing queue state is unacceptable.

use crate::types::ItemId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for workshop-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for workshop-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "steamcmd_path")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Queue state error
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Fetch tool error (launch, login, stall, abnormal exit)
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Post-processing error (relocation, cleanup)
    #[error("post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Item identifier failed validation
    #[error("invalid item id: {0:?}")]
    InvalidItemId(String),

    /// Source URL failed validation
    #[error("invalid source URL: {0}")]
    InvalidUrl(String),

    /// A batch is already fetching or post-processing
    #[error("a batch is already in progress")]
    BatchInProgress,

    /// Shutdown in progress - not accepting new items
    #[error("shutdown in progress: not accepting new items")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Queue state errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// The identifier is already active in the queue
    #[error("item {id} is already in the queue")]
    DuplicateItem {
        /// The item id that was re-added
        id: ItemId,
    },

    /// The identifier is not present in the queue
    #[error("item {id} not found in queue")]
    UnknownItem {
        /// The item id that was not found
        id: ItemId,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} item {id} in state {current_state}")]
    InvalidState {
        /// The item id in an invalid state for the operation
        id: ItemId,
        /// The operation that was attempted (e.g., "remove")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },
}

/// Fetch tool errors — batch-level failures of the external process
#[derive(Debug, Error)]
pub enum FetchError {
    /// Child process failed to start
    #[error("failed to launch {tool}: {reason}")]
    Launch {
        /// Path to the binary that failed to start
        tool: PathBuf,
        /// Underlying spawn error
        reason: String,
    },

    /// Login was rejected by the remote repository
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// No output and no exit within the inactivity timeout
    #[error("steamcmd produced no output for {}s and was killed", idle.as_secs())]
    Stalled {
        /// How long the process was silent before being killed
        idle: Duration,
    },

    /// Process exited abnormally without per-item outcomes
    #[error("steamcmd exited abnormally (code {code:?})")]
    AbnormalExit {
        /// Exit code, if the process exited rather than being signalled
        code: Option<i32>,
    },
}

/// Post-processing errors — per-item relocation and cleanup failures
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// Item was reported fetched but no payload exists in the scratch layout
    #[error("no payload for item {id} at {path}")]
    CorruptDownload {
        /// The item whose payload is missing or empty
        id: ItemId,
        /// Where the payload was expected
        path: PathBuf,
    },

    /// File move/rename failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the payload being moved
        source_path: PathBuf,
        /// The destination path where the payload should land
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// Scratch cleanup failed (non-fatal, logged as warning)
    #[error("cleanup failed for {path}: {reason}")]
    CleanupFailed {
        /// The scratch path that could not be removed
        path: PathBuf,
        /// The reason cleanup failed
        reason: String,
    },
}
