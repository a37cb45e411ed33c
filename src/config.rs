//! Configuration types for workshop-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Steam login mode used for the fetch tool invocation
///
/// Anonymous login is sufficient for most Workshop content; some titles
/// require a real account that owns the game.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LoginMode {
    /// `+login anonymous`
    #[default]
    Anonymous,

    /// `+login <username>` — steamcmd prompts for (or caches) the password
    Credentialed {
        /// Steam account name
        username: String,
    },
}

/// External tool configuration (steamcmd binary, app identifier)
///
/// Groups settings for locating and parameterizing the fetch tool.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path to the steamcmd executable (auto-detected if None)
    #[serde(default)]
    pub steamcmd_path: Option<PathBuf>,

    /// Whether to search PATH for steamcmd if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Steam app id whose Workshop the items belong to (default: Project Zomboid)
    #[serde(default = "default_app_id")]
    pub app_id: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            steamcmd_path: None,
            search_path: true,
            app_id: default_app_id(),
        }
    }
}

/// Download directory configuration
///
/// Groups settings related to where payloads land and where steamcmd writes
/// its scratch hierarchy. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Final directory items are relocated into (default: "./mods")
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,

    /// Directory handed to steamcmd as its install root (default: "./staging")
    ///
    /// steamcmd writes `steamapps/workshop/content/<app_id>/<item_id>/`
    /// beneath this directory; the hierarchy is removed after relocation.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Remove completed entries from the queue after a successful batch (default: true)
    #[serde(default = "default_true")]
    pub auto_clear_queue: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            target_dir: default_target_dir(),
            staging_dir: default_staging_dir(),
            auto_clear_queue: true,
        }
    }
}

/// Fetch behavior configuration (timeouts, queue polling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Kill the tool if it produces no output for this many seconds
    /// (default: 300, None disables the watchdog)
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: Option<u64>,

    /// Interval between queue polls in the background processor, in
    /// milliseconds (default: 500)
    #[serde(default = "default_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout(),
            queue_poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file (default: "./workshop-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for WorkshopDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`tool`](ToolConfig) — steamcmd binary and app identifier
/// - [`download`](DownloadConfig) — target/staging directories, auto-clear
/// - [`fetch`](FetchConfig) — inactivity watchdog, queue polling
/// - [`persistence`](PersistenceConfig) — database path
///
/// Sub-config fields are flattened for serialization, so the JSON/TOML format
/// stays flat (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// External tool settings
    #[serde(flatten)]
    pub tool: ToolConfig,

    /// Directory settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Login mode for the fetch tool
    #[serde(default)]
    pub login: LoginMode,

    /// Fetch behavior settings
    #[serde(flatten)]
    pub fetch: FetchConfig,

    /// Data storage settings
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Resolve the steamcmd binary to execute
    ///
    /// An explicitly configured path must exist; otherwise PATH is searched
    /// (when `search_path` is enabled). Both failure modes are configuration
    /// errors: no batch is attempted with an unusable tool path.
    pub fn resolve_steamcmd(&self) -> crate::Result<PathBuf> {
        if let Some(ref path) = self.tool.steamcmd_path {
            if !path.is_file() {
                return Err(crate::Error::Config {
                    message: format!("steamcmd not found at: {}", path.display()),
                    key: Some("steamcmd_path".to_string()),
                });
            }
            return Ok(path.clone());
        }

        if self.tool.search_path
            && let Ok(found) = which::which("steamcmd")
        {
            return Ok(found);
        }

        Err(crate::Error::Config {
            message: "no steamcmd path configured and none found in PATH".to_string(),
            key: Some("steamcmd_path".to_string()),
        })
    }

    /// Inactivity watchdog as a Duration (None disables it)
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.fetch.inactivity_timeout_secs.map(Duration::from_secs)
    }

    /// Queue poll interval for the background processor
    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fetch.queue_poll_interval_ms)
    }

    /// Validate directory settings
    ///
    /// The staging directory must be distinct from the target directory:
    /// relocation deletes the scratch hierarchy after moving payloads out of
    /// it, and the two coinciding would destroy relocated content.
    pub fn validate(&self) -> crate::Result<()> {
        if self.download.target_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config {
                message: "target directory is not set".to_string(),
                key: Some("target_dir".to_string()),
            });
        }
        if self.download.staging_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config {
                message: "staging directory is not set".to_string(),
                key: Some("staging_dir".to_string()),
            });
        }
        if self.download.staging_dir == self.download.target_dir {
            return Err(crate::Error::Config {
                message: "staging directory must differ from target directory".to_string(),
                key: Some("staging_dir".to_string()),
            });
        }
        if self.tool.app_id.is_empty() || !self.tool.app_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(crate::Error::Config {
                message: format!("app id must be numeric, got {:?}", self.tool.app_id),
                key: Some("app_id".to_string()),
            });
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_app_id() -> String {
    // Project Zomboid
    "108600".to_string()
}

fn default_target_dir() -> PathBuf {
    PathBuf::from("./mods")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_inactivity_timeout() -> Option<u64> {
    Some(300)
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./workshop-dl.db")
}
