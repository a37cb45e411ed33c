//! Classifier for steamcmd output lines
//!
//! steamcmd reports progress as free-form text on stdout/stderr. Each line is
//! matched against the known output vocabulary and turned into a tagged
//! event; anything unknown is forwarded as [`ProcessEvent::Unrecognized`]
//! rather than dropped, so diagnostics survive vocabulary drift between tool
//! versions.

use crate::types::ItemId;
use regex::Regex;
use std::sync::LazyLock;

/// One classified line of fetch tool output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Login sequence completed
    LoginOk,
    /// Login rejected, with the result code reported by the tool
    LoginFailed(String),
    /// Download of an item began
    ItemStart(ItemId),
    /// An item finished downloading
    ItemSuccess(ItemId),
    /// An item failed, with the reason reported by the tool
    ItemFailed {
        /// The item that failed
        id: ItemId,
        /// Failure reason, e.g. "Failure", "Timeout", "File Not Found"
        reason: String,
    },
    /// The remote repository throttled the session
    RateLimited {
        /// The item the limit was reported against, when per-item
        id: Option<ItemId>,
    },
    /// Line did not match any known vocabulary
    Unrecognized(String),
}

#[allow(clippy::expect_used)]
static ITEM_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Downloading item (\d+)\b").expect("static regex"));

#[allow(clippy::expect_used)]
static ITEM_SUCCESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Success\. Downloaded item (\d+)\b").expect("static regex"));

#[allow(clippy::expect_used)]
static ITEM_FAILED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ERROR! Download item (\d+) failed \(([^)]+)\)").expect("static regex")
});

/// Classify a single line of steamcmd output
///
/// The known vocabulary, from observed steamcmd sessions:
/// - `Logged in OK`
/// - `FAILED login with result code Invalid Password`
/// - `Downloading item 2392709985 ...`
/// - `Success. Downloaded item 2392709985 to "..." (123456 bytes)`
/// - `ERROR! Download item 2392709985 failed (Timeout).`
/// - `Rate Limit Exceeded`
pub fn classify(line: &str) -> ProcessEvent {
    let line = line.trim_end_matches(['\r', '\n']).trim();

    if line.starts_with("Logged in OK") {
        return ProcessEvent::LoginOk;
    }

    if let Some(code) = line.strip_prefix("FAILED login with result code ") {
        return ProcessEvent::LoginFailed(code.trim_end_matches('.').trim().to_string());
    }
    if line.starts_with("FAILED login") {
        return ProcessEvent::LoginFailed(line.to_string());
    }

    if let Some(caps) = ITEM_START.captures(line) {
        return ProcessEvent::ItemStart(ItemId(caps[1].to_string()));
    }

    if let Some(caps) = ITEM_SUCCESS.captures(line) {
        return ProcessEvent::ItemSuccess(ItemId(caps[1].to_string()));
    }

    if let Some(caps) = ITEM_FAILED.captures(line) {
        let id = ItemId(caps[1].to_string());
        let reason = caps[2].to_string();
        if is_rate_limit(&reason) {
            return ProcessEvent::RateLimited { id: Some(id) };
        }
        return ProcessEvent::ItemFailed { id, reason };
    }

    if is_rate_limit(line) {
        return ProcessEvent::RateLimited { id: None };
    }

    ProcessEvent::Unrecognized(line.to_string())
}

/// Whether a reason or line indicates remote throttling
fn is_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("rate limit")
}
