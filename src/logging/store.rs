//! # Durable Log Store
//!
//! SQLite-backed persistence for captured log entries. Every entry is written
//! with `synced = 0` and flipped to `synced = 1` once the remote sink has
//! acknowledged the batch containing it. Cleanup only ever touches synced
//! rows, so an entry that has not reached the sink survives indefinitely,
//! including across process restarts.
//!
//! The pool is a shared, lazily-initialized, process-wide resource;
//! concurrent readers and writers rely on SQLite's own transactional
//! guarantees rather than an application-level lock.

use crate::error::{PipelineError, Result};
use crate::logging::entry::{LogEntry, LogLevel};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Row counts split by sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total: u64,
    pub synced: u64,
    pub unsynced: u64,
}

/// Persistent queue of log entries with a synced flag
#[derive(Debug)]
pub struct DurableLogStore {
    database_url: String,
    pool: OnceCell<SqlitePool>,
}

impl DurableLogStore {
    /// Create a store backed by the given SQLite URL
    /// (e.g. `sqlite://logs.db` or `sqlite::memory:`). No connection is
    /// opened until [`initialize`](Self::initialize) or the first operation.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: OnceCell::new(),
        }
    }

    /// Idempotent: opens the database, creates the schema and indexes if
    /// missing. Safe to call from multiple tasks; only the first caller
    /// performs the work.
    pub async fn initialize(&self) -> Result<()> {
        self.pool().await?;
        Ok(())
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let options = SqliteConnectOptions::from_str(&self.database_url)
                    .map_err(PipelineError::Persistence)?
                    .create_if_missing(true);

                // A single connection keeps `sqlite::memory:` databases
                // coherent (each pooled connection would otherwise get its
                // own) and SQLite serializes writes regardless
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect_with(options)
                    .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS log_entries (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        timestamp TEXT NOT NULL,
                        level TEXT NOT NULL,
                        message TEXT NOT NULL,
                        data TEXT,
                        session_id TEXT NOT NULL,
                        user_id TEXT,
                        route_tag TEXT NOT NULL DEFAULT '',
                        synced INTEGER NOT NULL DEFAULT 0
                    )
                    "#,
                )
                .execute(&pool)
                .await?;

                for statement in [
                    "CREATE INDEX IF NOT EXISTS idx_log_entries_timestamp ON log_entries (timestamp)",
                    "CREATE INDEX IF NOT EXISTS idx_log_entries_level ON log_entries (level)",
                    "CREATE INDEX IF NOT EXISTS idx_log_entries_synced ON log_entries (synced)",
                    "CREATE INDEX IF NOT EXISTS idx_log_entries_session ON log_entries (session_id)",
                ] {
                    sqlx::query(statement).execute(&pool).await?;
                }

                info!(database_url = %self.database_url, "Durable log store initialized");
                Ok::<_, PipelineError>(pool)
            })
            .await
    }

    /// Append entries, all with `synced = 0`, in a single transaction
    pub async fn store_logs(&self, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        for entry in entries {
            let data = entry
                .data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| PipelineError::Validation(format!("unserializable log data: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO log_entries
                    (timestamp, level, message, data, session_id, user_id, route_tag, synced)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
                "#,
            )
            .bind(entry.timestamp_key())
            .bind(entry.level.as_str())
            .bind(&entry.message)
            .bind(data)
            .bind(&entry.session_id)
            .bind(&entry.user_id)
            .bind(&entry.route_tag)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = entries.len(), "Persisted log entries");
        Ok(())
    }

    /// All entries not yet acknowledged by the remote sink, oldest first
    pub async fn get_unsynced_logs(&self) -> Result<Vec<LogEntry>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            r#"
            SELECT timestamp, level, message, data, session_id, user_id, route_tag
            FROM log_entries
            WHERE synced = 0
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::entry_from_row(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    // A malformed row must not block recovery of the rest
                    warn!(error = %e, "Skipping undecodable log row");
                }
            }
        }
        Ok(entries)
    }

    /// Flip `synced = 1` on stored rows matching the given entries by
    /// (timestamp, session id, message). Returns the number of rows updated.
    pub async fn mark_logs_as_synced(&self, entries: &[LogEntry]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        let mut updated = 0u64;

        for entry in entries {
            let result = sqlx::query(
                r#"
                UPDATE log_entries
                SET synced = 1
                WHERE timestamp = ?1 AND session_id = ?2 AND message = ?3 AND synced = 0
                "#,
            )
            .bind(entry.timestamp_key())
            .bind(&entry.session_id)
            .bind(&entry.message)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        debug!(updated = updated, "Marked log entries as synced");
        Ok(updated)
    }

    /// Delete synced entries older than `max_age`. Unsynced entries are never
    /// deleted, regardless of age. Returns the number of rows removed.
    pub async fn cleanup_old_logs(&self, max_age: Duration) -> Result<u64> {
        let pool = self.pool().await?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age)
                .map_err(|e| PipelineError::Validation(format!("invalid retention window: {e}")))?;
        let cutoff_key = cutoff.to_rfc3339_opts(SecondsFormat::Micros, true);

        let result = sqlx::query(
            "DELETE FROM log_entries WHERE synced = 1 AND timestamp < ?1",
        )
        .bind(&cutoff_key)
        .execute(pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(deleted = deleted, cutoff = %cutoff_key, "Cleaned up old synced log entries");
        }
        Ok(deleted)
    }

    /// Row counts for diagnostics
    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(synced), 0) AS synced
            FROM log_entries
            "#,
        )
        .fetch_one(pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let synced: i64 = row.try_get("synced")?;

        Ok(StorageStats {
            total: total as u64,
            synced: synced as u64,
            unsynced: (total - synced) as u64,
        })
    }

    fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LogEntry> {
        let timestamp: String = row.try_get("timestamp")?;
        let level: String = row.try_get("level")?;
        let data: Option<String> = row.try_get("data")?;

        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| PipelineError::Validation(format!("bad stored timestamp: {e}")))?
            .with_timezone(&Utc);
        let level = level
            .parse::<LogLevel>()
            .map_err(PipelineError::Validation)?;
        let data = data
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| PipelineError::Validation(format!("bad stored data payload: {e}")))?;

        Ok(LogEntry {
            level,
            message: row.try_get("message")?,
            data,
            timestamp,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            route_tag: row.try_get("route_tag")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(message: &str, session: &str) -> LogEntry {
        LogEntry::new(
            LogLevel::Info,
            message,
            Some(json!({"k": 1})),
            session,
            Some("42".to_string()),
            "lessons",
        )
    }

    async fn memory_store() -> DurableLogStore {
        let store = DurableLogStore::new("sqlite::memory:");
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = memory_store().await;
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.get_storage_stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_store_and_sync_round_trip() {
        let store = memory_store().await;
        let entries = vec![entry("first", "s1"), entry("second", "s1")];

        store.store_logs(&entries).await.unwrap();

        let unsynced = store.get_unsynced_logs().await.unwrap();
        assert_eq!(unsynced.len(), 2);
        assert_eq!(unsynced[0].message, "first");
        assert_eq!(unsynced[0].data, Some(json!({"k": 1})));

        let updated = store.mark_logs_as_synced(&entries).await.unwrap();
        assert_eq!(updated, 2);
        assert!(store.get_unsynced_logs().await.unwrap().is_empty());

        let stats = store.get_storage_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.synced, 2);
        assert_eq!(stats.unsynced, 0);
    }

    #[tokio::test]
    async fn test_mark_as_synced_leaves_other_sessions_alone() {
        let store = memory_store().await;
        let mine = entry("shared message", "s1");
        let theirs = entry("shared message", "s2");
        store.store_logs(&[mine.clone(), theirs]).await.unwrap();

        let updated = store.mark_logs_as_synced(&[mine]).await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.get_storage_stats().await.unwrap().unsynced, 1);
    }

    #[tokio::test]
    async fn test_cleanup_never_deletes_unsynced() {
        let store = memory_store().await;
        let mut old_unsynced = entry("old unsynced", "s1");
        let mut old_synced = entry("old synced", "s1");
        old_unsynced.timestamp = Utc::now() - chrono::Duration::days(30);
        old_synced.timestamp = Utc::now() - chrono::Duration::days(30);

        store
            .store_logs(&[old_unsynced.clone(), old_synced.clone()])
            .await
            .unwrap();
        store.mark_logs_as_synced(&[old_synced]).await.unwrap();

        let deleted = store
            .cleanup_old_logs(Duration::from_secs(7 * 24 * 60 * 60))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.get_unsynced_logs().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "old unsynced");
    }

    #[tokio::test]
    async fn test_empty_batches_are_no_ops() {
        let store = memory_store().await;
        store.store_logs(&[]).await.unwrap();
        assert_eq!(store.mark_logs_as_synced(&[]).await.unwrap(), 0);
        assert_eq!(store.get_storage_stats().await.unwrap().total, 0);
    }
}
