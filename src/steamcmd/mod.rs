//! External fetch tool driver
//!
//! Spawns steamcmd for a batch of items, streams its combined stdout/stderr
//! line-by-line through the [`output`] classifier, and reports a terminal
//! [`BatchReport`] once the process exits. One invocation covers the whole
//! batch: login, one `+workshop_download_item` directive per id, `+quit`.
//!
//! The caller consumes live [`ProcessEvent`]s from the returned channel while
//! the driver task accumulates per-item outcomes. Cancellation and the
//! inactivity watchdog are both observed at the line-read suspension point
//! and terminate the child forcefully.

pub mod output;

pub use output::ProcessEvent;

use crate::config::{Config, LoginMode};
use crate::error::FetchError;
use crate::types::ItemId;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-item outcome accumulated from the output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The tool reported the item downloaded
    Success,
    /// The tool reported the item failed, with its reason
    Failed(String),
    /// The item was rate-limited — retriable, should be requeued
    Retry,
    /// The tool never reported the item either way before exit
    ///
    /// Treated as failed for safety: a payload that was never confirmed
    /// must not be relocated.
    Unknown,
}

/// How a batch invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchDisposition {
    /// Process exited with usable per-item outcomes
    Completed,
    /// Login was rejected; per-item outcomes are meaningless
    LoginFailed(String),
    /// Killed by the inactivity watchdog
    Stalled(Duration),
    /// Exited abnormally before reporting any per-item outcome
    AbnormalExit(Option<i32>),
    /// Cancelled by the caller
    Cancelled,
}

/// Terminal result of one batch invocation
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// How the batch ended
    pub disposition: BatchDisposition,
    /// One outcome per batch item, in batch order
    pub outcomes: Vec<(ItemId, ItemOutcome)>,
}

/// Handle to an in-flight batch
pub struct RunningBatch {
    /// Live classified output events
    pub events: mpsc::Receiver<ProcessEvent>,
    /// Resolves to the terminal report once the process exits
    pub report: tokio::task::JoinHandle<BatchReport>,
}

/// Fixed scratch-hierarchy root beneath the staging directory
///
/// steamcmd owns everything under `<staging>/steamapps`; the whole subtree is
/// removed after a successful batch.
pub fn scratch_root(staging_dir: &Path) -> PathBuf {
    staging_dir.join("steamapps")
}

/// Payload directory steamcmd writes one item's content into
///
/// The tool's layout is fixed: `<staging>/steamapps/workshop/content/<app>/<item>`.
/// Any deviation from it is treated as a corrupt download.
pub fn item_payload_dir(staging_dir: &Path, app_id: &str, id: &ItemId) -> PathBuf {
    staging_dir
        .join("steamapps")
        .join("workshop")
        .join("content")
        .join(app_id)
        .join(id.as_str())
}

/// Driver for the external steamcmd binary
pub struct SteamCmd {
    binary: PathBuf,
    app_id: String,
    staging_dir: PathBuf,
    login: LoginMode,
    inactivity_timeout: Option<Duration>,
}

impl SteamCmd {
    /// Create a driver with explicit parameters
    pub fn new(
        binary: PathBuf,
        app_id: String,
        staging_dir: PathBuf,
        login: LoginMode,
        inactivity_timeout: Option<Duration>,
    ) -> Self {
        Self {
            binary,
            app_id,
            staging_dir,
            login,
            inactivity_timeout,
        }
    }

    /// Create a driver from configuration, resolving the binary path
    ///
    /// Fails with a configuration error when no usable binary is found, so a
    /// batch is never attempted against a bad tool path.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let binary = config.resolve_steamcmd()?;
        Ok(Self::new(
            binary,
            config.tool.app_id.clone(),
            config.download.staging_dir.clone(),
            config.login.clone(),
            config.inactivity_timeout(),
        ))
    }

    /// Build the argument list for a batch
    ///
    /// `+login <mode>`, `+force_install_dir <staging>`, one
    /// `+workshop_download_item <app> <item>` per id, `+quit`.
    pub fn command_args(&self, items: &[ItemId]) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(items.len() * 3 + 5);

        args.push("+login".into());
        match &self.login {
            LoginMode::Anonymous => args.push("anonymous".into()),
            LoginMode::Credentialed { username } => args.push(username.clone().into()),
        }

        args.push("+force_install_dir".into());
        args.push(self.staging_dir.clone().into_os_string());

        for id in items {
            args.push("+workshop_download_item".into());
            args.push(self.app_id.clone().into());
            args.push(id.as_str().into());
        }

        args.push("+quit".into());
        args
    }

    /// Launch the tool for a batch of items
    ///
    /// Returns immediately with a [`RunningBatch`]; the child's combined
    /// output is pumped in the background. A spawn failure is a batch-level
    /// [`FetchError::Launch`] and nothing is started.
    pub fn run(
        &self,
        items: Vec<ItemId>,
        cancel: CancellationToken,
    ) -> Result<RunningBatch, FetchError> {
        let mut command = Command::new(&self.binary);
        command
            .args(self.command_args(&items))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(tool = %self.binary.display(), batch_size = items.len(), "launching fetch tool");

        let mut child = command.spawn().map_err(|e| FetchError::Launch {
            tool: self.binary.clone(),
            reason: e.to_string(),
        })?;

        // Merge stdout and stderr into one line channel. Each pipe gets its
        // own forwarder task; the channel closes once both hit EOF.
        let (line_tx, line_rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_forwarder(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_forwarder(stderr, line_tx.clone());
        }
        drop(line_tx);

        let (event_tx, event_rx) = mpsc::channel::<ProcessEvent>(256);
        let inactivity = self.inactivity_timeout;
        let report = tokio::spawn(async move {
            pump_output(child, line_rx, event_tx, items, cancel, inactivity).await
        });

        Ok(RunningBatch {
            events: event_rx,
            report,
        })
    }
}

/// Forward one pipe's lines into the merged channel
fn spawn_line_forwarder<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "fetch tool output stream read error");
                    break;
                }
            }
        }
    });
}

enum NextLine {
    Line(String),
    Eof,
    Idle,
}

async fn next_line(rx: &mut mpsc::Receiver<String>, idle: Option<Duration>) -> NextLine {
    match idle {
        Some(timeout) => match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(line)) => NextLine::Line(line),
            Ok(None) => NextLine::Eof,
            Err(_) => NextLine::Idle,
        },
        None => match rx.recv().await {
            Some(line) => NextLine::Line(line),
            None => NextLine::Eof,
        },
    }
}

/// Consume the child's output until exit, cancellation, or stall
///
/// Classifies each line, forwards it as an event, and accumulates per-item
/// outcomes. The final report is authoritative: items never reported by the
/// stream come back as [`ItemOutcome::Unknown`].
async fn pump_output(
    mut child: Child,
    mut lines: mpsc::Receiver<String>,
    events: mpsc::Sender<ProcessEvent>,
    items: Vec<ItemId>,
    cancel: CancellationToken,
    inactivity: Option<Duration>,
) -> BatchReport {
    let mut outcomes: HashMap<ItemId, ItemOutcome> = HashMap::new();
    let mut login_failure: Option<String> = None;
    let mut early_disposition: Option<BatchDisposition> = None;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("batch cancelled, killing fetch tool");
                early_disposition = Some(BatchDisposition::Cancelled);
                break;
            }
            next = next_line(&mut lines, inactivity) => next,
        };

        let raw = match next {
            NextLine::Line(raw) => raw,
            NextLine::Eof => break,
            NextLine::Idle => {
                let idle = inactivity.unwrap_or_default();
                warn!(idle_secs = idle.as_secs(), "fetch tool produced no output, killing it");
                early_disposition = Some(BatchDisposition::Stalled(idle));
                break;
            }
        };

        let event = output::classify(&raw);
        match &event {
            ProcessEvent::LoginFailed(reason) => {
                login_failure = Some(reason.clone());
            }
            ProcessEvent::ItemSuccess(id) => {
                if items.contains(id) {
                    outcomes.insert(id.clone(), ItemOutcome::Success);
                } else {
                    debug!(item_id = %id, "success reported for id outside the batch");
                }
            }
            ProcessEvent::ItemFailed { id, reason } => {
                if items.contains(id) {
                    outcomes.insert(id.clone(), ItemOutcome::Failed(reason.clone()));
                }
            }
            ProcessEvent::RateLimited { id: Some(id) } => {
                if items.contains(id) {
                    outcomes.insert(id.clone(), ItemOutcome::Retry);
                }
            }
            _ => {}
        }

        // Forward every classified line, Unrecognized included; a dropped
        // receiver just means nobody is listening anymore.
        if events.send(event).await.is_err() {
            debug!("event receiver dropped, continuing to drain tool output");
        }
    }

    let disposition = match early_disposition {
        Some(disposition) => {
            // Forceful termination; kill() also reaps the child.
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill fetch tool");
            }
            disposition
        }
        None => {
            // Both pipes hit EOF; collect the exit status.
            let status = child.wait().await;
            match status {
                Ok(status) => {
                    if let Some(reason) = login_failure {
                        BatchDisposition::LoginFailed(reason)
                    } else if status.success() || !outcomes.is_empty() {
                        // Per-item classifications win over the exit code.
                        BatchDisposition::Completed
                    } else {
                        BatchDisposition::AbnormalExit(status.code())
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to collect fetch tool exit status");
                    BatchDisposition::AbnormalExit(None)
                }
            }
        }
    };

    let outcomes = items
        .into_iter()
        .map(|id| {
            let outcome = outcomes.remove(&id).unwrap_or(ItemOutcome::Unknown);
            (id, outcome)
        })
        .collect();

    BatchReport {
        disposition,
        outcomes,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
