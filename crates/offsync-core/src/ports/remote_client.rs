//! Remote client port (driven/secondary port)
//!
//! Generic create/read/update/delete against the backend. Every call is
//! addressed by an endpoint derived from a logical [`Key`] and returns the
//! server's canonical representation of the resource.
//!
//! ## Design Notes
//!
//! - Errors are classified ([`RemoteError`]) because the sync pipeline
//!   branches on them: `NotFound` and `Conflict` are control flow, the rest
//!   are delivery failures.
//! - [`RemoteRecord`] is a port-level DTO; the engine maps it to an [`Entry`].

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{now_millis, Entry, Key};

/// The server's representation of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Resource payload as returned by the server
    pub data: Value,
    /// Server-assigned revision, when the backend exposes one
    pub version: Option<u64>,
    /// Server modification time (epoch millis), when exposed
    pub last_modified: Option<i64>,
}

impl RemoteRecord {
    /// Wraps a payload with no server metadata
    pub fn new(data: Value) -> Self {
        Self {
            data,
            version: None,
            last_modified: None,
        }
    }

    /// Builds a record from a JSON response body
    ///
    /// Lifts `version` and `updatedAt` / `updated_at` / `lastModified`
    /// (epoch millis or RFC 3339) out of object bodies. The body itself is
    /// kept untouched as the payload.
    pub fn from_json(body: Value) -> Self {
        let version = body.get("version").and_then(Value::as_u64);
        let last_modified = ["updatedAt", "updated_at", "lastModified"]
            .iter()
            .find_map(|field| body.get(*field).and_then(parse_timestamp));

        Self {
            data: body,
            version,
            last_modified,
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_last_modified(mut self, last_modified: i64) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Maps the record to an [`Entry`] for `key`
    ///
    /// Missing server metadata falls back to the previous local revision's
    /// version and to the current time.
    pub fn into_entry(self, key: Key, previous: Option<&Entry>, device_id: &str) -> Entry {
        let version = self
            .version
            .unwrap_or_else(|| previous.map_or(1, |p| p.metadata.version));
        let last_modified = self.last_modified.unwrap_or_else(now_millis);
        Entry::server(key, self.data, version, last_modified, device_id)
    }
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

/// Errors returned by a [`RemoteClient`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    /// Transport-level failure (DNS, connection refused, reset, ...)
    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// The resource does not exist on the server
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The server rejected the write because its copy changed
    #[error("server reported a conflicting revision")]
    Conflict { current: Option<RemoteRecord> },

    /// Any other non-success response
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
            RemoteError::NotFound(_) | RemoteError::Conflict { .. } | RemoteError::Decode(_) => {
                false
            }
        }
    }
}

/// Port trait for backend CRUD
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Creates the resource at `endpoint`
    async fn create(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError>;

    /// Reads the resource at `endpoint`
    async fn read(&self, endpoint: &str) -> Result<RemoteRecord, RemoteError>;

    /// Replaces the resource at `endpoint`
    async fn update(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError>;

    /// Deletes the resource at `endpoint`
    async fn delete(&self, endpoint: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_json_lifts_metadata() {
        let record = RemoteRecord::from_json(json!({
            "title": "Run 10k",
            "version": 4,
            "updatedAt": 150
        }));

        assert_eq!(record.version, Some(4));
        assert_eq!(record.last_modified, Some(150));
        assert_eq!(record.data["title"], "Run 10k");
    }

    #[test]
    fn test_from_json_parses_rfc3339() {
        let record = RemoteRecord::from_json(json!({
            "updated_at": "1970-01-01T00:00:01Z"
        }));
        assert_eq!(record.last_modified, Some(1_000));
    }

    #[test]
    fn test_from_json_scalar_body() {
        let record = RemoteRecord::from_json(json!(42));
        assert_eq!(record.data, json!(42));
        assert!(record.version.is_none());
        assert!(record.last_modified.is_none());
    }

    #[test]
    fn test_into_entry_falls_back_to_previous_version() {
        let key = Key::parse("goal_1").unwrap();
        let previous = Entry::server(key.clone(), json!({}), 7, 10, "dev");

        let entry = RemoteRecord::new(json!({"a": 1}))
            .with_last_modified(20)
            .into_entry(key.clone(), Some(&previous), "dev");
        assert_eq!(entry.metadata.version, 7);
        assert_eq!(entry.metadata.last_modified, 20);

        let entry = RemoteRecord::new(json!({"a": 1}))
            .with_version(9)
            .into_entry(key, Some(&previous), "dev");
        assert_eq!(entry.metadata.version, 9);
    }

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Status {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(RemoteError::Status {
            status: 429,
            message: String::new()
        }
        .is_transient());
        assert!(!RemoteError::Status {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!RemoteError::NotFound("/x".into()).is_transient());
        assert!(!RemoteError::Conflict { current: None }.is_transient());
    }
}
