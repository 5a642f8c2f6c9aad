//! SQLite implementation of KeyValueStore
//!
//! Every value lives in one row of `kv_store`, keyed by the document name.
//! `set_many` writes all rows inside a single transaction so a crash never
//! leaves a half-written group of documents behind.
//!
//! The schema version is tracked in `PRAGMA user_version`; opening a
//! database applies any schema steps it has not seen yet.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use offsync_core::ports::KeyValueStore;

use crate::CacheError;

/// Ordered schema steps; index + 1 is the version a step brings the file to
const SCHEMA: &[&str] = &[include_str!("migrations/20261018_initial.sql")];

const UPSERT: &str = "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
                      ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                      updated_at = excluded.updated_at";

/// SQLite-backed key/value store for engine state
///
/// The engine writes whole documents under one lock, so a small pool is
/// enough. File databases use WAL with `synchronous = NORMAL`: a committed
/// `set_many` survives a process crash.
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Opens (or creates) the database at `path`, creating missing parent
    /// directories
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(2));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("{}: {}", path.display(), e))
            })?;

        let store = Self { pool };
        let version = store.migrate().await?;
        tracing::info!(path = %path.display(), schema_version = version, "Opened state database");
        Ok(store)
    }

    /// Opens a private in-memory database
    ///
    /// A single connection keeps the data alive for the lifetime of the store.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory database: {}", e)))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Schema version of the open database
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    /// Returns every stored key in lexical order
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM kv_store ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    /// Waits for in-flight queries and closes every connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<i64, CacheError> {
        let current = self.schema_version().await?;
        let target = SCHEMA.len() as i64;

        for (index, step) in SCHEMA.iter().enumerate().skip(current.max(0) as usize) {
            let version = index as i64 + 1;
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(step)
                .execute(&mut *tx)
                .await
                .map_err(|e| CacheError::MigrationFailed(format!("step {}: {}", version, e)))?;
            // PRAGMA does not accept bound parameters
            sqlx::raw_sql(&format!("PRAGMA user_version = {}", version))
                .execute(&mut *tx)
                .await
                .map_err(|e| CacheError::MigrationFailed(format!("step {}: {}", version, e)))?;
            tx.commit().await?;
            tracing::debug!(version, "Applied schema step");
        }

        Ok(current.max(target))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(CacheError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        tracing::trace!(key = %key, bytes = value.len(), "Stored value");
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(CacheError::from)?;

        for (key, value) in entries {
            sqlx::query(UPSERT)
                .bind(*key)
                .bind(value)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(CacheError::from)?;
        }

        tx.commit().await.map_err(CacheError::from)?;

        tracing::trace!(count = entries.len(), "Stored values atomically");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from)?;

        tracing::trace!(key = %key, "Removed value");
        Ok(())
    }
}
