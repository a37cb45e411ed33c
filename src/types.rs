//! Core types for workshop-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a Workshop item
///
/// Wraps the published-file id handed out by the remote repository. The id is
/// treated as an opaque string: it is validated for shape (non-empty, no
/// whitespace) but never interpreted numerically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId, validating its shape
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(crate::Error::InvalidItemId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// Implement sqlx Type, Encode, and Decode so ids bind directly in queries
impl sqlx::Type<sqlx::Sqlite> for ItemId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ItemId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ItemId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Derive an ItemId from a Workshop page URL
///
/// Workshop item pages carry the published-file id in the `id` query
/// parameter (`.../filedetails/?id=123456`). Returns `None` when the URL does
/// not parse or carries no usable id.
pub fn item_id_from_url(raw: &str) -> Option<ItemId> {
    let parsed = url::Url::parse(raw).ok()?;
    let id = parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())?;
    ItemId::new(id).ok()
}

/// Item status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Queued and waiting for the next batch
    Queued,
    /// Currently being fetched by steamcmd
    Fetching,
    /// Fetched, payload being relocated
    Processing,
    /// Successfully completed
    Completed,
    /// Failed with error
    Failed,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Queued,
            1 => Status::Fetching,
            2 => Status::Processing,
            3 => Status::Completed,
            4 => Status::Failed,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Queued => 0,
            Status::Fetching => 1,
            Status::Processing => 2,
            Status::Completed => 3,
            Status::Failed => 4,
        }
    }

    /// Whether this status is terminal for an attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

/// Pipeline stage at which a failure occurred
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// steamcmd fetch stage
    Fetch,
    /// Payload relocation stage
    Relocate,
}

/// Request to add an item to the download queue
///
/// This is the shape the browser/presentation layer hands to the core.
/// Dependencies are the "Required Items" collected from the item's Workshop
/// page at selection time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewItem {
    /// Workshop published-file id
    pub id: String,

    /// Workshop page URL the item was selected from
    #[serde(default)]
    pub source_url: Option<String>,

    /// Display title (may be unknown until after fetch)
    #[serde(default)]
    pub title: Option<String>,

    /// Required items this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item added to the queue
    Queued {
        /// Item ID
        id: ItemId,
        /// Display title (if known)
        title: Option<String>,
    },

    /// Item removed from the queue
    Removed {
        /// Item ID
        id: ItemId,
    },

    /// All queued items cleared
    QueueCleared,

    /// A batch started fetching
    BatchStarted {
        /// Every item in the batch, dependency closure included
        items: Vec<ItemId>,
    },

    /// steamcmd logged in successfully
    LoginSucceeded,

    /// steamcmd began fetching an item
    Fetching {
        /// Item ID
        id: ItemId,
    },

    /// steamcmd reported an item downloaded
    ItemFetched {
        /// Item ID
        id: ItemId,
    },

    /// steamcmd reported an item failed
    ItemFetchFailed {
        /// Item ID
        id: ItemId,
        /// Failure reason as reported by the tool
        reason: String,
    },

    /// The remote repository rate-limited the batch
    RateLimited {
        /// Item the limit was reported against (if any)
        id: Option<ItemId>,
    },

    /// Unclassified tool output, forwarded for diagnostics
    ToolOutput {
        /// Raw output line
        line: String,
    },

    /// Item payload is being relocated
    Processing {
        /// Item ID
        id: ItemId,
    },

    /// Item payload relocated into the target directory
    Relocated {
        /// Item ID
        id: ItemId,
        /// Folder names created under the target directory
        folders: Vec<String>,
    },

    /// Item fully complete
    Completed {
        /// Item ID
        id: ItemId,
    },

    /// Item failed at some stage
    Failed {
        /// Item ID
        id: ItemId,
        /// Stage where failure occurred
        stage: Stage,
        /// Error message
        error: String,
    },

    /// Item returned to the queue for a future attempt
    Requeued {
        /// Item ID
        id: ItemId,
    },

    /// The whole batch failed (launch, login, stall, abnormal exit)
    BatchFailed {
        /// Aggregated error message
        error: String,
        /// Number of items returned to the queue
        requeued: usize,
    },

    /// The batch was cancelled by the caller
    BatchCancelled {
        /// Number of items returned to the queue
        requeued: usize,
    },

    /// The batch ran to completion
    BatchFinished {
        /// Items that completed
        completed: usize,
        /// Items that failed
        failed: usize,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Information about an item in the queue
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Workshop published-file id
    pub id: ItemId,

    /// Display title (if known)
    pub title: Option<String>,

    /// Workshop page URL (if known)
    pub source_url: Option<String>,

    /// Current status
    pub status: Status,

    /// Error message from the last failed attempt
    pub error_message: Option<String>,

    /// Required items this one depends on
    pub dependencies: Vec<ItemId>,

    /// When the item was added to the queue
    pub created_at: DateTime<Utc>,

    /// When the last fetch attempt started
    pub started_at: Option<DateTime<Utc>>,

    /// When the item reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
}

/// Historical item record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique record identifier
    pub id: i64,

    /// Workshop published-file id
    pub item_id: ItemId,

    /// Display title (if known)
    pub title: Option<String>,

    /// Final status (Completed or Failed)
    pub status: Status,

    /// Error message (for failed items)
    pub error_message: Option<String>,

    /// Folder names created under the target directory
    pub folders: Vec<String>,

    /// When the item reached its terminal status
    pub completed_at: DateTime<Utc>,
}

/// Queue statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total number of items tracked in the queue store
    pub total: usize,

    /// Number of queued items (waiting for the next batch)
    pub queued: usize,

    /// Number of items being fetched
    pub fetching: usize,

    /// Number of items in post-processing
    pub processing: usize,

    /// Number of completed items not yet cleared
    pub completed: usize,

    /// Number of failed items
    pub failed: usize,
}

/// Outcome summary of one batch run
#[derive(Clone, Debug, Default)]
pub struct BatchSummary {
    /// Items that completed
    pub completed: Vec<ItemId>,

    /// Items that failed, with their failure reasons
    pub failed: Vec<(ItemId, String)>,

    /// Items returned to the queue for a future attempt
    pub requeued: Vec<ItemId>,
}

impl BatchSummary {
    /// Whether the batch had nothing to do
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty() && self.requeued.is_empty()
    }
}
