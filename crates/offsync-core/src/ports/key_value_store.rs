//! Key/value persistence port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, ...) and don't need domain-level classification.
//! - Values are opaque strings; the engine stores JSON documents.
//! - `set_many` must be atomic: either every pair is written or none is.

/// Port trait for the engine's durable storage
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Writes several pairs atomically
    async fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()>;

    /// Deletes `key`; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}
