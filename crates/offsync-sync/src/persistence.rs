//! Typed persistence of engine state
//!
//! Engine state is stored as JSON documents under fixed keys of a
//! [`KeyValueStore`]:
//!
//! | key | value |
//! |-----|-------|
//! | `offline_data` | map of logical key to entry |
//! | `sync_queue` | ordered array of queue items |
//! | `conflict_queue` | array of conflict records |
//! | `device_id` | string |
//! | `last_sync_timestamp` | epoch millis |
//! | `conflict_resolution_logs` | capped array of log entries |
//!
//! Saves write every requested section in one atomic `set_many` call.

use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;

use offsync_core::domain::SyncQueueItem;
use offsync_core::ports::KeyValueStore;

use crate::conflict_queue::{ConflictQueue, ResolutionLog};
use crate::offline_store::OfflineStore;
use crate::queue::SyncQueue;

pub const OFFLINE_DATA_KEY: &str = "offline_data";
pub const SYNC_QUEUE_KEY: &str = "sync_queue";
pub const CONFLICT_QUEUE_KEY: &str = "conflict_queue";
pub const DEVICE_ID_KEY: &str = "device_id";
pub const LAST_SYNC_KEY: &str = "last_sync_timestamp";
pub const RESOLUTION_LOGS_KEY: &str = "conflict_resolution_logs";

/// Everything the engine persists apart from the device id
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub store: OfflineStore,
    pub queue: SyncQueue,
    pub conflicts: ConflictQueue,
    pub logs: ResolutionLog,
    /// Completion time of the last clean drain (epoch millis, 0 = never)
    pub last_sync: i64,
}

/// A separately persisted part of [`EngineState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    OfflineData,
    SyncQueue,
    ConflictQueue,
    LastSync,
    ResolutionLogs,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::OfflineData,
        Section::SyncQueue,
        Section::ConflictQueue,
        Section::LastSync,
        Section::ResolutionLogs,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Section::OfflineData => OFFLINE_DATA_KEY,
            Section::SyncQueue => SYNC_QUEUE_KEY,
            Section::ConflictQueue => CONFLICT_QUEUE_KEY,
            Section::LastSync => LAST_SYNC_KEY,
            Section::ResolutionLogs => RESOLUTION_LOGS_KEY,
        }
    }
}

pub struct PersistenceLayer {
    store: Arc<dyn KeyValueStore>,
}

impl PersistenceLayer {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads engine state; missing documents load as empty
    ///
    /// A document that exists but cannot be decoded is an error: silently
    /// starting empty would discard queued mutations.
    pub async fn load(&self) -> anyhow::Result<EngineState> {
        let store: OfflineStore = self.read_json(OFFLINE_DATA_KEY).await?;
        let items: Vec<SyncQueueItem> = self.read_json(SYNC_QUEUE_KEY).await?;
        let conflicts: ConflictQueue = self.read_json(CONFLICT_QUEUE_KEY).await?;
        let logs: ResolutionLog = self.read_json(RESOLUTION_LOGS_KEY).await?;
        let last_sync: i64 = self.read_json(LAST_SYNC_KEY).await?;

        tracing::debug!(
            entries = store.len(),
            queued = items.len(),
            conflicts = conflicts.len(),
            last_sync,
            "Loaded engine state"
        );

        Ok(EngineState {
            store,
            queue: SyncQueue::from_items(items),
            conflicts,
            logs,
            last_sync,
        })
    }

    /// Writes the given sections of `state` atomically
    pub async fn save(&self, state: &EngineState, sections: &[Section]) -> anyhow::Result<()> {
        let mut pairs = Vec::with_capacity(sections.len());
        for section in sections {
            let value = match section {
                Section::OfflineData => serde_json::to_string(&state.store)?,
                Section::SyncQueue => {
                    let items: Vec<&SyncQueueItem> = state.queue.items().collect();
                    serde_json::to_string(&items)?
                }
                Section::ConflictQueue => serde_json::to_string(&state.conflicts)?,
                Section::LastSync => serde_json::to_string(&state.last_sync)?,
                Section::ResolutionLogs => serde_json::to_string(&state.logs)?,
            };
            pairs.push((section.key(), value));
        }

        self.store
            .set_many(&pairs)
            .await
            .context("Failed to write engine state")?;

        tracing::trace!(sections = ?sections, "Persisted engine state");
        Ok(())
    }

    pub async fn load_device_id(&self) -> anyhow::Result<Option<String>> {
        match self.store.get(DEVICE_ID_KEY).await? {
            Some(raw) => {
                let id = serde_json::from_str(&raw).context("Corrupt device_id document")?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    pub async fn save_device_id(&self, device_id: &str) -> anyhow::Result<()> {
        let raw = serde_json::to_string(device_id)?;
        self.store
            .set(DEVICE_ID_KEY, &raw)
            .await
            .context("Failed to write device id")
    }

    async fn read_json<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        match self
            .store
            .get(key)
            .await
            .with_context(|| format!("Failed to read {key}"))?
        {
            Some(raw) => {
                serde_json::from_str(&raw).with_context(|| format!("Corrupt {key} document"))
            }
            None => Ok(T::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use offsync_cache::MemoryKeyValueStore;
    use offsync_core::domain::{
        ConflictRecord, Entry, Key, MetadataOverrides, Operation, ResolutionLogEntry,
        ResolutionStrategy,
    };

    use super::*;

    fn entry(key: &str) -> Entry {
        Entry::local(
            Key::parse(key).unwrap(),
            json!({"k": key}),
            None,
            &MetadataOverrides::default(),
            "dev",
        )
    }

    #[tokio::test]
    async fn test_load_from_empty_store() {
        let layer = PersistenceLayer::new(Arc::new(MemoryKeyValueStore::new()));

        let state = layer.load().await.unwrap();
        assert!(state.store.is_empty());
        assert!(state.queue.is_empty());
        assert_eq!(state.last_sync, 0);
        assert!(layer.load_device_id().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_all_sections() {
        let kv = MemoryKeyValueStore::new();
        let layer = PersistenceLayer::new(Arc::new(kv.clone()));

        let mut state = EngineState::default();
        state.store.put(entry("a"));
        state.queue.enqueue(entry("a"), Operation::Create);
        state.queue.begin_drain(0, 0);
        state.queue.enqueue(entry("b"), Operation::Create);
        let record = ConflictRecord::sync_failed(entry("c"), Operation::Update, "boom");
        state.conflicts.push(record.clone());
        state
            .logs
            .push(ResolutionLogEntry::new(ResolutionStrategy::Manual, record, "dev"));
        state.last_sync = 1234;

        layer.save(&state, &Section::ALL).await.unwrap();
        assert_eq!(kv.len().await, 5);

        let loaded = layer.load().await.unwrap();
        assert_eq!(loaded.store, state.store);
        let order: Vec<_> = loaded.queue.items().map(|i| i.key().to_string()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(loaded.conflicts, state.conflicts);
        assert_eq!(loaded.logs, state.logs);
        assert_eq!(loaded.last_sync, 1234);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let kv = MemoryKeyValueStore::new();
        kv.set(SYNC_QUEUE_KEY, "{not json").await.unwrap();

        let layer = PersistenceLayer::new(Arc::new(kv));
        assert!(layer.load().await.is_err());
    }

    #[tokio::test]
    async fn test_device_id_round_trip() {
        let layer = PersistenceLayer::new(Arc::new(MemoryKeyValueStore::new()));
        layer.save_device_id("linux_1_abcdef012").await.unwrap();

        assert_eq!(
            layer.load_device_id().await.unwrap().as_deref(),
            Some("linux_1_abcdef012")
        );
    }
}
