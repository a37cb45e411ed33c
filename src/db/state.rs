//! Runtime state tracking (clean-shutdown detection).

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

const CLEAN_SHUTDOWN_KEY: &str = "clean_shutdown";

impl Database {
    /// Mark that the process is starting up
    ///
    /// Clears the clean-shutdown flag so a crash before the next
    /// [`set_clean_shutdown`](Self::set_clean_shutdown) is detectable on the
    /// following start.
    pub async fn set_clean_start(&self) -> Result<()> {
        self.put_state(CLEAN_SHUTDOWN_KEY, "0").await
    }

    /// Mark that the process shut down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.put_state(CLEAN_SHUTDOWN_KEY, "1").await
    }

    /// Whether the previous session shut down cleanly
    ///
    /// A fresh database (no flag recorded yet) counts as clean.
    pub async fn was_clean_shutdown(&self) -> Result<bool> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_state WHERE key = ?")
                .bind(CLEAN_SHUTDOWN_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to read shutdown flag: {}",
                        e
                    )))
                })?;

        Ok(value.as_deref() != Some("0"))
    }

    async fn put_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_state (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write app state: {}",
                e
            )))
        })?;

        Ok(())
    }
}
