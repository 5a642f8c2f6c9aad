//! Finite timeouts for remote calls
//!
//! Wraps any [`RemoteClient`] so a hung request surfaces as
//! [`RemoteError::Timeout`] instead of wedging the coordinator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use offsync_core::ports::{RemoteClient, RemoteError, RemoteRecord};

pub struct TimedRemote {
    inner: Arc<dyn RemoteClient>,
    timeout: Duration,
}

impl TimedRemote {
    pub fn new(inner: Arc<dyn RemoteClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }
}

#[async_trait::async_trait]
impl RemoteClient for TimedRemote {
    async fn create(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
        self.bounded(self.inner.create(endpoint, data)).await
    }

    async fn read(&self, endpoint: &str) -> Result<RemoteRecord, RemoteError> {
        self.bounded(self.inner.read(endpoint)).await
    }

    async fn update(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
        self.bounded(self.inner.update(endpoint, data)).await
    }

    async fn delete(&self, endpoint: &str) -> Result<(), RemoteError> {
        self.bounded(self.inner.delete(endpoint)).await
    }
}
