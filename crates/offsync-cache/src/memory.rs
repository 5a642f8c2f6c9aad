//! In-memory implementation of KeyValueStore
//!
//! Contents live as long as the value does. Cloning shares the underlying
//! map, which lets tests "restart" an engine against the same storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use offsync_core::ports::KeyValueStore;

/// Process-local key/value store
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        let mut values = self.values.write().await;
        for (key, value) in entries {
            values.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_contents() {
        let store = MemoryKeyValueStore::new();
        let other = store.clone();

        store.set("device_id", "\"dev\"").await.unwrap();
        assert_eq!(
            other.get("device_id").await.unwrap().as_deref(),
            Some("\"dev\"")
        );
    }

    #[tokio::test]
    async fn test_set_many_and_remove() {
        let store = MemoryKeyValueStore::new();
        store
            .set_many(&[("a", "1".to_string()), ("b", "2".to_string())])
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        store.remove("a").await.unwrap();
        store.remove("missing").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(!store.is_empty().await);
    }
}
