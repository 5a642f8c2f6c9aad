//! offsync Cache - Durable key/value storage
//!
//! Two `KeyValueStore` backends: [`SqliteKeyValueStore`] for real
//! deployments and [`MemoryKeyValueStore`] for tests and ephemeral engines.
//! Neither knows anything about the documents it holds.

pub mod memory;
pub mod store;

pub use memory::MemoryKeyValueStore;
pub use store::SqliteKeyValueStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
