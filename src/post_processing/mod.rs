//! Post-processing pipeline for fetched items
//!
//! After a batch reports its successes, each item's payload is moved out of
//! the tool's scratch layout (`<staging>/steamapps/workshop/content/<app>/<item>`)
//! into the target directory, and the scratch hierarchy is removed once every
//! relocation in the batch has succeeded.
//!
//! Relocation uses replace semantics: a destination folder left over from a
//! previous download is deleted before the move, never merged, so stale files
//! cannot survive a re-download.

use crate::config::Config;
use crate::error::PostProcessError;
use crate::steamcmd::{item_payload_dir, scratch_root};
use crate::types::{Event, ItemId};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Per-item relocation result: created folder names, or the failure
pub type RelocationResult = Result<Vec<String>, PostProcessError>;

/// Payload relocation and scratch cleanup executor
pub struct PostProcessor {
    /// Event channel for emitting pipeline events
    event_tx: broadcast::Sender<Event>,
    /// Configuration for staging/target directories and app id
    config: Arc<Config>,
}

impl PostProcessor {
    /// Create a new post-processing executor
    pub fn new(event_tx: broadcast::Sender<Event>, config: Arc<Config>) -> Self {
        Self { event_tx, config }
    }

    /// Relocate every successfully fetched item of a batch
    ///
    /// Returns one result per item, in input order. The scratch hierarchy is
    /// removed only when every relocation succeeded; any failure leaves it in
    /// place for inspection, so no data is lost. Cleanup failure itself is
    /// logged but never fails the batch — the payloads already moved.
    pub async fn process_batch(&self, items: &[ItemId]) -> Vec<(ItemId, RelocationResult)> {
        let mut results = Vec::with_capacity(items.len());
        let mut all_relocated = true;

        for id in items {
            self.event_tx.send(Event::Processing { id: id.clone() }).ok();

            let result = self.relocate_item(id).await;
            match &result {
                Ok(folders) => {
                    info!(item_id = %id, ?folders, "payload relocated");
                    self.event_tx
                        .send(Event::Relocated {
                            id: id.clone(),
                            folders: folders.clone(),
                        })
                        .ok();
                }
                Err(e) => {
                    all_relocated = false;
                    warn!(item_id = %id, error = %e, "payload relocation failed");
                }
            }

            results.push((id.clone(), result));
        }

        if items.is_empty() {
            return results;
        }

        if all_relocated {
            self.cleanup_scratch().await;
        } else {
            info!(
                scratch = %scratch_root(&self.config.download.staging_dir).display(),
                "scratch hierarchy preserved for inspection after relocation failure"
            );
        }

        results
    }

    /// Relocate one item's payload into the target directory
    ///
    /// Workshop payloads commonly carry a `mods/` subfolder whose children
    /// are the actual mod folders; those children land directly under the
    /// target directory. A payload without a `mods/` subfolder is moved
    /// wholesale to `<target>/<item id>`.
    async fn relocate_item(&self, id: &ItemId) -> RelocationResult {
        let payload = item_payload_dir(
            &self.config.download.staging_dir,
            &self.config.tool.app_id,
            id,
        );
        let target = &self.config.download.target_dir;

        if !is_nonempty_dir(&payload).await {
            return Err(PostProcessError::CorruptDownload {
                id: id.clone(),
                path: payload,
            });
        }

        fs::create_dir_all(target)
            .await
            .map_err(|e| PostProcessError::MoveFailed {
                source_path: payload.clone(),
                dest_path: target.clone(),
                reason: format!("failed to create target directory: {}", e),
            })?;

        let mut folders = Vec::new();
        let mods_dir = payload.join("mods");

        if is_nonempty_dir(&mods_dir).await {
            debug!(item_id = %id, "relocating children of mods subfolder");

            let mut entries =
                fs::read_dir(&mods_dir)
                    .await
                    .map_err(|e| PostProcessError::MoveFailed {
                        source_path: mods_dir.clone(),
                        dest_path: target.clone(),
                        reason: e.to_string(),
                    })?;

            while let Some(entry) =
                entries
                    .next_entry()
                    .await
                    .map_err(|e| PostProcessError::MoveFailed {
                        source_path: mods_dir.clone(),
                        dest_path: target.clone(),
                        reason: e.to_string(),
                    })?
            {
                let name = entry.file_name();
                let dest = target.join(&name);
                replace_entry(&entry.path(), &dest).await?;
                folders.push(name.to_string_lossy().into_owned());
            }
        } else {
            debug!(item_id = %id, "no mods subfolder, relocating whole payload");
            let dest = target.join(id.as_str());
            replace_entry(&payload, &dest).await?;
            folders.push(id.as_str().to_string());
        }

        Ok(folders)
    }

    /// Remove the tool's scratch hierarchy after a fully relocated batch
    ///
    /// Failure here is only logged: the payloads are already safe in the
    /// target directory, and a locked or half-removed scratch tree will be
    /// retried after the next batch.
    async fn cleanup_scratch(&self) {
        let scratch = scratch_root(&self.config.download.staging_dir);

        match fs::metadata(&scratch).await {
            Ok(_) => {
                if let Err(e) = fs::remove_dir_all(&scratch).await {
                    let err = PostProcessError::CleanupFailed {
                        path: scratch,
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "scratch cleanup failed");
                } else {
                    debug!(scratch = %scratch.display(), "scratch hierarchy removed");
                }
            }
            Err(_) => {
                debug!(scratch = %scratch.display(), "no scratch hierarchy to clean up");
            }
        }
    }
}

/// Whether a path is a directory with at least one entry
async fn is_nonempty_dir(path: &Path) -> bool {
    let Ok(mut entries) = fs::read_dir(path).await else {
        return false;
    };
    matches!(entries.next_entry().await, Ok(Some(_)))
}

/// Move `source` to `dest`, fully replacing anything already at `dest`
async fn replace_entry(source: &Path, dest: &Path) -> Result<(), PostProcessError> {
    // Replace semantics: drop any leftover from a previous download first
    if let Ok(meta) = fs::metadata(dest).await {
        let removal = if meta.is_dir() {
            fs::remove_dir_all(dest).await
        } else {
            fs::remove_file(dest).await
        };
        removal.map_err(|e| PostProcessError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            reason: format!("failed to replace existing destination: {}", e),
        })?;
    }

    if fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }

    // Rename failed (commonly a cross-device move) — copy then remove
    copy_recursive(source, dest)
        .await
        .map_err(|e| PostProcessError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;

    fs::remove_dir_all(source)
        .await
        .map_err(|e| PostProcessError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            reason: format!("copied but failed to remove source: {}", e),
        })?;

    Ok(())
}

/// Recursively copy a directory tree
fn copy_recursive<'a>(
    source: &'a Path,
    dest: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir_all(dest).await?;

        let mut entries = fs::read_dir(source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let dest_path = dest.join(entry.file_name());

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                copy_recursive(&entry_path, &dest_path).await?;
            } else {
                fs::copy(&entry_path, &dest_path).await?;
            }
        }

        Ok(())
    })
}
