//! Shared test doubles for engine scenario tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use offsync_cache::MemoryKeyValueStore;
use offsync_core::config::SyncConfig;
use offsync_core::domain::{now_millis, ResolutionStrategy};
use offsync_core::ports::{KeyValueStore, RemoteClient, RemoteError, RemoteRecord};
use offsync_conflict::StrategyPolicy;
use offsync_sync::{ConnectivityHandle, NetworkMonitor, SyncEngine};

/// One call received by [`ScriptedRemote`]
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub endpoint: String,
    pub data: Option<Value>,
}

/// In-process backend with scriptable failures
///
/// Keeps one record per endpoint and assigns increasing versions on every
/// write.
#[derive(Default)]
pub struct ScriptedRemote {
    records: Mutex<HashMap<String, RemoteRecord>>,
    calls: Mutex<Vec<Call>>,
    write_failure: Mutex<Option<RemoteError>>,
    conflict_on_write: AtomicBool,
    delay: Mutex<Duration>,
    versions: AtomicU64,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Puts a record on the server without recording a call
    pub fn seed(&self, endpoint: &str, data: Value, last_modified: i64) {
        let record = RemoteRecord::new(data)
            .with_version(self.next_version())
            .with_last_modified(last_modified);
        self.records
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), record);
    }

    /// Deletes a record without recording a call
    pub fn forget(&self, endpoint: &str) {
        self.records.lock().unwrap().remove(endpoint);
    }

    pub fn record(&self, endpoint: &str) -> Option<RemoteRecord> {
        self.records.lock().unwrap().get(endpoint).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that modify server state
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method != "read")
            .collect()
    }

    /// Makes every create/update/delete fail with `error`
    pub fn fail_writes(&self, error: Option<RemoteError>) {
        *self.write_failure.lock().unwrap() = error;
    }

    /// Answers writes to existing records with a conflict
    pub fn conflict_on_write(&self, enabled: bool) {
        self.conflict_on_write.store(enabled, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn enter(&self, method: &'static str, endpoint: &str, data: Option<&Value>) {
        self.calls.lock().unwrap().push(Call {
            method,
            endpoint: endpoint.to_string(),
            data: data.cloned(),
        });
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_write(&self, endpoint: &str) -> Result<(), RemoteError> {
        if let Some(error) = self.write_failure.lock().unwrap().clone() {
            return Err(error);
        }
        if self.conflict_on_write.load(Ordering::SeqCst) {
            if let Some(current) = self.record(endpoint) {
                return Err(RemoteError::Conflict {
                    current: Some(current),
                });
            }
        }
        Ok(())
    }

    fn write(&self, endpoint: &str, data: &Value) -> RemoteRecord {
        let record = RemoteRecord::new(data.clone())
            .with_version(self.next_version())
            .with_last_modified(now_millis());
        self.records
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), record.clone());
        record
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn create(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
        self.enter("create", endpoint, Some(data)).await;
        self.check_write(endpoint)?;
        Ok(self.write(endpoint, data))
    }

    async fn read(&self, endpoint: &str) -> Result<RemoteRecord, RemoteError> {
        self.enter("read", endpoint, None).await;
        self.record(endpoint)
            .ok_or_else(|| RemoteError::NotFound(endpoint.to_string()))
    }

    async fn update(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
        self.enter("update", endpoint, Some(data)).await;
        self.check_write(endpoint)?;
        if self.record(endpoint).is_none() {
            return Err(RemoteError::NotFound(endpoint.to_string()));
        }
        Ok(self.write(endpoint, data))
    }

    async fn delete(&self, endpoint: &str) -> Result<(), RemoteError> {
        self.enter("delete", endpoint, None).await;
        self.check_write(endpoint)?;
        self.records
            .lock()
            .unwrap()
            .remove(endpoint)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(endpoint.to_string()))
    }
}

/// Key/value store whose writes can be made to fail
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryKeyValueStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        self.check()?;
        self.inner.set_many(entries).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.check()?;
        self.inner.remove(key).await
    }
}

/// Sync settings with no spacing between retries
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        retry_delay_secs: 0,
        ..SyncConfig::default()
    }
}

/// Starts an engine without the background trigger loop
pub async fn start_engine(
    store: Arc<dyn KeyValueStore>,
    remote: Arc<ScriptedRemote>,
    online: bool,
    strategy: ResolutionStrategy,
) -> (SyncEngine, ConnectivityHandle) {
    let (network, connectivity) = NetworkMonitor::new(online);
    let engine = SyncEngine::builder(store, remote, network)
        .sync_config(test_sync_config())
        .policy(StrategyPolicy::uniform(strategy))
        .background(false)
        .initialize()
        .await
        .unwrap();
    (engine, connectivity)
}
