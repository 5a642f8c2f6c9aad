//! Public engine handle
//!
//! [`SyncEngine`] is what applications talk to. Local reads and writes never
//! wait on the network: writes are applied and persisted immediately, then
//! queued for the coordinator. The only errors callers see are persistence
//! failures and invalid arguments.
//!
//! ```text
//! SyncEngine ──commit──→ SharedState ──save──→ PersistenceLayer ──→ KeyValueStore
//!     │                      ↑
//!     └──→ SyncCoordinator ──┘──→ TimedRemote ──→ RemoteClient
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use offsync_conflict::{ConflictResolver, MergeRegistry, StrategyPolicy};
use offsync_core::config::{ConflictsConfig, SyncConfig};
use offsync_core::domain::{
    now_millis, ConflictRecord, ConflictStatus, ConflictType, Entry, Key, ManualChoice,
    MetadataOverrides, Operation, ResolutionLogEntry, ResolutionStrategy, SyncQueueItem,
    SyncStatus,
};
use offsync_core::ports::{KeyValueStore, RemoteClient, RemoteError};

use crate::coordinator::{DrainOutcome, SyncCoordinator};
use crate::network::NetworkMonitor;
use crate::persistence::{EngineState, PersistenceLayer, Section};
use crate::remote::TimedRemote;
use crate::state::SharedState;
use crate::EngineError;

/// Point-in-time view of the engine for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub is_online: bool,
    pub sync_in_progress: bool,
    pub last_sync_timestamp: i64,
    pub pending_sync_items: usize,
    pub pending_conflicts: usize,
    pub offline_data_count: usize,
    pub device_id: String,
}

/// Sections touched by a local store or delete
const LOCAL_WRITE: [Section; 3] = [Section::OfflineData, Section::SyncQueue, Section::ConflictQueue];

/// Applies a local mutation and routes it to the sync queue
///
/// A key with a pending conflict stays out of the queue until the operator
/// decides; the write is folded into its conflict record instead. Returns
/// the stored entry and whether it was parked.
fn record_local_write(s: &mut EngineState, mut entry: Entry, operation: Operation) -> (Entry, bool) {
    let parked = s.conflicts.is_parked(&entry.key);
    if parked {
        entry.conflict_status = ConflictStatus::Detected;
        s.conflicts.absorb(&entry, operation);
    } else {
        s.queue.enqueue(entry.clone(), operation);
    }
    s.store.put(entry.clone());
    (entry, parked)
}

/// Generates a device id of the form `{platform}_{millis}_{random}`
fn generate_device_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", std::env::consts::OS, now_millis(), &random[..9])
}

/// Configures and starts a [`SyncEngine`]
pub struct SyncEngineBuilder {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteClient>,
    network: NetworkMonitor,
    sync: SyncConfig,
    policy: StrategyPolicy,
    mergers: MergeRegistry,
    background: bool,
}

impl SyncEngineBuilder {
    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.sync = config;
        self
    }

    /// Uses the strategy rules from a `conflicts` config section
    pub fn conflicts(mut self, config: &ConflictsConfig) -> Self {
        self.policy = StrategyPolicy::from_config(config);
        self
    }

    pub fn policy(mut self, policy: StrategyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mergers(mut self, mergers: MergeRegistry) -> Self {
        self.mergers = mergers;
        self
    }

    /// Whether to run the reconnect/periodic trigger loop (default: true)
    pub fn background(mut self, enabled: bool) -> Self {
        self.background = enabled;
        self
    }

    /// Loads persisted state and starts the engine
    ///
    /// Generates and persists a device id on first run. Sync settings the
    /// coordinator cannot run with are rejected before anything is loaded.
    pub async fn initialize(self) -> Result<SyncEngine, EngineError> {
        let problems = self.sync.validate();
        if !problems.is_empty() {
            let joined = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EngineError::InvalidConfig(joined));
        }

        let persistence = PersistenceLayer::new(self.store);

        let device_id = match persistence.load_device_id().await? {
            Some(id) => id,
            None => {
                let id = generate_device_id();
                persistence.save_device_id(&id).await?;
                info!(device_id = %id, "Generated device id");
                id
            }
        };

        let loaded = persistence.load().await?;
        let pending = loaded.queue.len();
        let conflicts = loaded.conflicts.len();
        let state = Arc::new(SharedState::new(loaded, persistence));

        let remote: Arc<dyn RemoteClient> =
            Arc::new(TimedRemote::new(self.remote, self.sync.remote_timeout()));
        let resolver = ConflictResolver::new(
            Arc::clone(&remote),
            self.policy,
            self.mergers,
            device_id.clone(),
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&state),
            Arc::clone(&remote),
            resolver,
            self.network.clone(),
            self.sync,
            device_id.clone(),
        ));

        let cancel = CancellationToken::new();
        let task = if self.background {
            let events = self.network.events();
            Some(tokio::spawn(
                Arc::clone(&coordinator).run(events, cancel.clone()),
            ))
        } else {
            None
        };

        info!(
            device_id = %device_id,
            pending,
            conflicts,
            online = self.network.is_online(),
            background = self.background,
            "Sync engine initialized"
        );

        Ok(SyncEngine {
            state,
            remote,
            coordinator,
            network: self.network,
            device_id,
            cancel,
            task,
        })
    }
}

/// Handle to a running offline sync engine
pub struct SyncEngine {
    state: Arc<SharedState>,
    remote: Arc<dyn RemoteClient>,
    coordinator: Arc<SyncCoordinator>,
    network: NetworkMonitor,
    device_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncEngine {
    pub fn builder(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteClient>,
        network: NetworkMonitor,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            store,
            remote,
            network,
            sync: SyncConfig::default(),
            policy: StrategyPolicy::default(),
            mergers: MergeRegistry::default(),
            background: true,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    // ========================================================================
    // Local data
    // ========================================================================

    /// Stores `data` under `key` and queues it for sync
    pub async fn store(&self, key: &str, data: Value) -> Result<Entry, EngineError> {
        self.store_with(key, data, MetadataOverrides::default()).await
    }

    /// Stores `data` with caller-supplied metadata
    pub async fn store_with(
        &self,
        key: &str,
        data: Value,
        overrides: MetadataOverrides,
    ) -> Result<Entry, EngineError> {
        let key = Key::parse(key)?;
        let device_id = self.device_id.as_str();

        let (entry, parked) = self
            .state
            .commit(&LOCAL_WRITE, |s| {
                let previous = s.store.get(&key);
                let operation = match previous {
                    Some(p) if !p.deleted => Operation::Update,
                    _ => Operation::Create,
                };
                let entry = Entry::local(key.clone(), data, previous, &overrides, device_id);
                record_local_write(s, entry, operation)
            })
            .await?;

        debug!(key = %entry.key, version = entry.metadata.version, parked, "Stored entry");
        Ok(entry)
    }

    /// Deletes `key` locally and queues the delete
    ///
    /// Returns false when there was nothing to delete.
    pub async fn remove(&self, key: &str) -> Result<bool, EngineError> {
        let key = Key::parse(key)?;
        let device_id = self.device_id.as_str();

        let removed = self
            .state
            .commit(&LOCAL_WRITE, |s| {
                let Some(previous) = s.store.get(&key).filter(|e| !e.deleted) else {
                    return false;
                };
                let tombstone = Entry::tombstone(key.clone(), Some(previous), device_id);
                record_local_write(s, tombstone, Operation::Delete);
                true
            })
            .await?;

        if removed {
            debug!(key = %key, "Removed entry");
        }
        Ok(removed)
    }

    /// Reads `key`, refreshing from the server first when asked and online
    ///
    /// Network failures fall back to the local entry. Tombstones read as
    /// absent.
    pub async fn retrieve(&self, key: &str, fetch_from_server: bool) -> Result<Option<Value>, EngineError> {
        let key = Key::parse(key)?;
        let local = self.state.read(|s| s.store.get(&key).cloned()).await;

        if fetch_from_server && self.network.is_online() {
            match self.remote.read(&key.endpoint()).await {
                Ok(record) => {
                    let remote_entry = record.into_entry(key.clone(), local.as_ref(), &self.device_id);
                    let current = self.coordinator.reconcile(local, remote_entry).await?;
                    return Ok(current.and_then(|e| e.visible_data().cloned()));
                }
                Err(RemoteError::NotFound(_)) => {
                    debug!(key = %key, "Not on server, using local entry");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Server read failed, using local entry");
                }
            }
        }

        Ok(local.and_then(|e| e.visible_data().cloned()))
    }

    /// Full local entry for `key`, including tombstones
    pub async fn entry(&self, key: &str) -> Result<Option<Entry>, EngineError> {
        let key = Key::parse(key)?;
        Ok(self.state.read(|s| s.store.get(&key).cloned()).await)
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Drains the sync queue now
    pub async fn synchronize(&self) -> Result<DrainOutcome, EngineError> {
        self.coordinator.drain().await
    }

    pub async fn status(&self) -> EngineStatus {
        let (last_sync, pending_sync_items, pending_conflicts, offline_data_count) = self
            .state
            .read(|s| {
                (
                    s.last_sync,
                    s.queue.len(),
                    s.conflicts.records().iter().filter(|r| r.is_pending()).count(),
                    s.store.entries().filter(|e| !e.deleted).count(),
                )
            })
            .await;

        EngineStatus {
            is_online: self.network.is_online(),
            sync_in_progress: self.coordinator.is_draining(),
            last_sync_timestamp: last_sync,
            pending_sync_items,
            pending_conflicts,
            offline_data_count,
            device_id: self.device_id.clone(),
        }
    }

    /// Queued mutations, in-flight items first
    pub async fn pending_sync_items(&self) -> Vec<SyncQueueItem> {
        self.state
            .read(|s| s.queue.items().cloned().collect())
            .await
    }

    // ========================================================================
    // Conflicts
    // ========================================================================

    pub async fn pending_conflicts(&self) -> Vec<ConflictRecord> {
        self.state
            .read(|s| {
                s.conflicts
                    .records()
                    .iter()
                    .filter(|r| r.is_pending())
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Most recent resolution log entries, oldest first
    pub async fn resolution_logs(&self) -> Vec<ResolutionLogEntry> {
        self.state
            .read(|s| s.logs.entries().cloned().collect())
            .await
    }

    /// Settles the pending conflict for `key` with an operator decision
    ///
    /// - `UseLocal`: keep the local entry and queue it again
    /// - `UseServer`: adopt the current server record and drop queued
    ///   mutations for the key; fails with [`EngineError::Offline`] when the
    ///   server cannot be reached
    /// - `UseCustom`: store `data` and queue it as an update
    ///
    /// Returns the resulting local entry.
    pub async fn resolve_manually(
        &self,
        key: &str,
        choice: ManualChoice,
        data: Option<Value>,
    ) -> Result<Option<Entry>, EngineError> {
        let key = Key::parse(key)?;
        if choice == ManualChoice::UseCustom && data.is_none() {
            return Err(EngineError::CustomDataRequired);
        }

        let record = self
            .state
            .read(|s| s.conflicts.get(&key).cloned())
            .await
            .ok_or_else(|| EngineError::ConflictNotFound(key.to_string()))?;

        let device_id = self.device_id.as_str();
        let log = ResolutionLogEntry::new(ResolutionStrategy::Manual, record.clone().resolve(), device_id)
            .with_choice(choice);

        let result = match choice {
            ManualChoice::UseServer => {
                if !self.network.is_online() {
                    return Err(EngineError::Offline("use_server"));
                }
                let server_entry = match self.remote.read(&key.endpoint()).await {
                    Ok(r) => Some(r.into_entry(key.clone(), Some(&record.local_entry), device_id)),
                    Err(RemoteError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                };

                self.state
                    .commit(&Section::ALL, |s| {
                        s.queue.drop_key(&key);
                        s.conflicts.remove(&key);
                        s.logs.push(log);

                        match server_entry {
                            Some(mut entry) => {
                                entry.sync_status = SyncStatus::Synced;
                                entry.conflict_status = ConflictStatus::Resolved;
                                s.store.put(entry.clone());
                                Some(entry)
                            }
                            None => {
                                s.store.remove(&key);
                                None
                            }
                        }
                    })
                    .await?
            }
            ManualChoice::UseLocal => {
                self.state
                    .commit(&Section::ALL, |s| {
                        let Some(current) = s.store.get_mut(&key) else {
                            return Err(EngineError::MissingLocalEntry(key.to_string()));
                        };
                        current.sync_status = SyncStatus::Pending;
                        current.conflict_status = ConflictStatus::Resolved;
                        let entry = current.clone();

                        let operation = if entry.deleted {
                            Operation::Delete
                        } else if record.conflict_type == ConflictType::SyncFailed {
                            record.operation.unwrap_or(Operation::Update)
                        } else {
                            Operation::Update
                        };
                        s.queue.enqueue(entry.clone(), operation);
                        s.conflicts.remove(&key);
                        s.logs.push(log);
                        Ok(Some(entry))
                    })
                    .await??
            }
            ManualChoice::UseCustom => {
                let data = data.unwrap_or(Value::Null);
                self.state
                    .commit(&Section::ALL, |s| {
                        let entry = Entry::local(
                            key.clone(),
                            data,
                            s.store.get(&key),
                            &MetadataOverrides::default(),
                            device_id,
                        )
                        .with_conflict_status(ConflictStatus::Resolved);
                        s.store.put(entry.clone());
                        s.queue.enqueue(entry.clone(), Operation::Update);
                        s.conflicts.remove(&key);
                        s.logs.push(log);
                        Some(entry)
                    })
                    .await?
            }
        };

        info!(key = %key, choice = %choice, conflict_type = %record.conflict_type, "Conflict resolved manually");
        Ok(result)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Wipes entries, queues, logs and the last sync time
    ///
    /// The device id is kept. Outcomes of an in-flight drain for wiped items
    /// are discarded.
    pub async fn clear_all(&self) -> Result<(), EngineError> {
        self.state
            .commit(&Section::ALL, |s| {
                s.store.clear();
                s.queue.clear();
                s.conflicts.clear();
                s.logs.clear();
                s.last_sync = 0;
            })
            .await?;

        info!("Cleared all engine state");
        Ok(())
    }

    /// Stops the trigger loop and persists state one last time
    pub async fn shutdown(mut self) -> Result<(), EngineError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Coordinator task ended abnormally");
            }
        }

        self.state.flush().await?;
        info!(device_id = %self.device_id, "Sync engine shut down");
        Ok(())
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_shape() {
        let id = generate_device_id();
        let parts: Vec<&str> = id.rsplitn(3, '_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 9);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2], std::env::consts::OS);
    }
}
