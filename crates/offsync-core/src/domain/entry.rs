//! Versioned entries
//!
//! An [`Entry`] is what this device currently believes about one logical
//! key: the application payload plus the sync bookkeeping needed to push it
//! to the server and to detect conflicting edits.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::key::Key;

/// Current wall-clock time as epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whether an entry has been acknowledged by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local change not yet acknowledged
    Pending,
    /// Matches the server's last known state
    Synced,
    /// Last push attempt failed
    Failed,
}

/// Conflict bookkeeping for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    None,
    Detected,
    Resolved,
}

/// Where the current payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Offline,
    Server,
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntrySource::Offline => "offline",
            EntrySource::Server => "server",
        };
        write!(f, "{}", s)
    }
}

/// Sync metadata carried by every entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// When this revision was written locally (epoch millis)
    pub timestamp: i64,
    /// Monotonic per-key revision counter
    pub version: u64,
    /// When the payload was last modified by its author (epoch millis)
    pub last_modified: i64,
    pub source: EntrySource,
    pub device_id: String,
}

/// Caller-supplied overrides applied when storing an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOverrides {
    /// Author modification time; defaults to "now"
    pub last_modified: Option<i64>,
    /// Payload origin; defaults to [`EntrySource::Offline`]
    pub source: Option<EntrySource>,
}

/// The unit of synchronized data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub key: Key,
    pub data: Value,
    pub metadata: EntryMetadata,
    pub sync_status: SyncStatus,
    pub conflict_status: ConflictStatus,
    /// Tombstone marker for a logical delete awaiting propagation
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Entry {
    /// Builds the next local revision of `key`
    ///
    /// The version continues from `previous` (or starts at 1) so repeated
    /// stores of identical data still produce distinct revisions.
    pub fn local(
        key: Key,
        data: Value,
        previous: Option<&Entry>,
        overrides: &MetadataOverrides,
        device_id: &str,
    ) -> Self {
        let now = now_millis();
        Self {
            key,
            data,
            metadata: EntryMetadata {
                timestamp: now,
                version: previous.map_or(1, |p| p.metadata.version + 1),
                last_modified: overrides.last_modified.unwrap_or(now),
                source: overrides.source.unwrap_or(EntrySource::Offline),
                device_id: device_id.to_string(),
            },
            sync_status: SyncStatus::Pending,
            conflict_status: ConflictStatus::None,
            deleted: false,
        }
    }

    /// Builds a tombstone revision for a logical delete
    pub fn tombstone(key: Key, previous: Option<&Entry>, device_id: &str) -> Self {
        let mut entry = Self::local(
            key,
            Value::Null,
            previous,
            &MetadataOverrides::default(),
            device_id,
        );
        entry.deleted = true;
        entry
    }

    /// Builds an entry from the server's representation of `key`
    pub fn server(
        key: Key,
        data: Value,
        version: u64,
        last_modified: i64,
        device_id: &str,
    ) -> Self {
        Self {
            key,
            data,
            metadata: EntryMetadata {
                timestamp: now_millis(),
                version,
                last_modified,
                source: EntrySource::Server,
                device_id: device_id.to_string(),
            },
            sync_status: SyncStatus::Synced,
            conflict_status: ConflictStatus::None,
            deleted: false,
        }
    }

    /// Payload visible to readers; tombstones read as absent
    pub fn visible_data(&self) -> Option<&Value> {
        if self.deleted {
            None
        } else {
            Some(&self.data)
        }
    }

    /// True when both values describe the same local revision
    pub fn same_revision(&self, other: &Entry) -> bool {
        self.metadata.version == other.metadata.version
            && self.metadata.timestamp == other.metadata.timestamp
    }

    /// Returns the entry with the given conflict status
    pub fn with_conflict_status(mut self, status: ConflictStatus) -> Self {
        self.conflict_status = status;
        self
    }
}
