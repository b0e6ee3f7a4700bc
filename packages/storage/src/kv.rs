// ABOUTME: SQLite-backed key/value table with per-entry expiry
// ABOUTME: Provides get/set, prefix scans, prefix deletes and expired-entry sweeps

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::{Result, StorageError};

/// Key/value store where every entry carries an absolute expiry time.
///
/// Reads never return expired entries, whether or not a sweep has run.
#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    /// Open (or create) a database file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::Io(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Opened conversation database at {}", path.display());
        Self::from_pool(pool).await
    }

    /// In-memory database, mainly for tests.
    ///
    /// Pinned to a single connection that never recycles: each SQLite
    /// in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_entries_expires_at ON kv_entries(expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get an unexpired value
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Upsert a single entry
    pub async fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.set_many(&[(key, value, expires_at)]).await
    }

    /// Upsert several entries atomically
    pub async fn set_many(&self, entries: &[(&str, &str, DateTime<Utc>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value, expires_at) in entries {
            sqlx::query(
                r#"
                INSERT INTO kv_entries (key, value, expires_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(*key)
            .bind(*value)
            .bind(expires_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete keys, returning how many rows existed
    pub async fn delete(&self, keys: &[&str]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;

        for key in keys {
            removed += sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Delete every entry whose key starts with `prefix`, expired or not
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM kv_entries WHERE substr(key, 1, length(?1)) = ?1")
            .bind(prefix)
            .execute(&self.pool)
            .await?
            .rows_affected();

        debug!("Deleted {} entries with prefix '{}'", removed, prefix);
        Ok(removed)
    }

    /// All unexpired entries under a prefix
    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT key, value FROM kv_entries WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2",
        )
        .bind(prefix)
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("key"), r.get::<String, _>("value")))
            .collect())
    }

    /// Remove expired entries under a prefix, returning the removed keys
    pub async fn purge_expired(&self, prefix: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "DELETE FROM kv_entries WHERE substr(key, 1, length(?1)) = ?1 AND expires_at <= ?2 RETURNING key",
        )
        .bind(prefix)
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
