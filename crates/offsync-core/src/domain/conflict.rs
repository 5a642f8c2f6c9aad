//! Conflict domain entities
//!
//! This module defines types for recording disagreements between the local
//! and remote state of a key, the strategies used to settle them, and the
//! audit trail those resolutions leave behind.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::{now_millis, Entry};
use super::errors::DomainError;
use super::key::Key;
use super::queue::Operation;

/// Maximum number of resolution log entries retained
pub const RESOLUTION_LOG_CAPACITY: usize = 100;

/// Why a conflict record exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides changed since the last successful sync
    ConcurrentModification,
    /// Timestamps are inconclusive but the payloads disagree
    DataDifference,
    /// A queued mutation exhausted its retries
    SyncFailed,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictType::ConcurrentModification => "concurrent_modification",
            ConflictType::DataDifference => "data_difference",
            ConflictType::SyncFailed => "sync_failed",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle of a conflict record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictState {
    PendingManualResolution,
    Resolved,
}

/// Conflict resolution policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Overwrite local with the server's version
    #[default]
    ServerWins,
    /// Push local data and adopt the server's echo
    ClientWins,
    /// Shallow merge with local fields taking precedence
    Merge,
    /// Park the conflict for a human decision
    Manual,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 4] = [
        ResolutionStrategy::ServerWins,
        ResolutionStrategy::ClientWins,
        ResolutionStrategy::Merge,
        ResolutionStrategy::Manual,
    ];
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionStrategy::ServerWins => "server_wins",
            ResolutionStrategy::ClientWins => "client_wins",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ResolutionStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server_wins" => Ok(ResolutionStrategy::ServerWins),
            "client_wins" => Ok(ResolutionStrategy::ClientWins),
            "merge" => Ok(ResolutionStrategy::Merge),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(DomainError::InvalidStrategy(other.to_string())),
        }
    }
}

/// Operator decision for a parked conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualChoice {
    UseLocal,
    UseServer,
    UseCustom,
}

impl std::fmt::Display for ManualChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ManualChoice::UseLocal => "use_local",
            ManualChoice::UseServer => "use_server",
            ManualChoice::UseCustom => "use_custom",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ManualChoice {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use_local" => Ok(ManualChoice::UseLocal),
            "use_server" => Ok(ManualChoice::UseServer),
            "use_custom" => Ok(ManualChoice::UseCustom),
            other => Err(DomainError::InvalidChoice(other.to_string())),
        }
    }
}

/// A detected disagreement for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: Uuid,
    pub key: Key,
    pub conflict_type: ConflictType,
    pub local_entry: Entry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_entry: Option<Entry>,
    pub timestamp: i64,
    pub status: ConflictState,
    /// Last delivery error, for escalated queue items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Queued operation that was pending for the key when it was parked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

impl ConflictRecord {
    /// Creates a record for a local/remote disagreement
    pub fn detected(conflict_type: ConflictType, local: Entry, remote: Entry) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: local.key.clone(),
            conflict_type,
            local_entry: local,
            remote_entry: Some(remote),
            timestamp: now_millis(),
            status: ConflictState::PendingManualResolution,
            error: None,
            operation: None,
        }
    }

    /// Creates a record for a queued mutation that exhausted its retries
    pub fn sync_failed(local: Entry, operation: Operation, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: local.key.clone(),
            conflict_type: ConflictType::SyncFailed,
            local_entry: local,
            remote_entry: None,
            timestamp: now_millis(),
            status: ConflictState::PendingManualResolution,
            error: Some(error.into()),
            operation: Some(operation),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ConflictState::PendingManualResolution
    }

    /// Returns the record marked resolved
    #[must_use]
    pub fn resolve(mut self) -> Self {
        self.status = ConflictState::Resolved;
        self
    }
}

/// Append-only diagnostic record of a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionLogEntry {
    pub key: Key,
    pub strategy: ResolutionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<ManualChoice>,
    pub conflict: ConflictRecord,
    pub timestamp: i64,
    pub device_id: String,
}

impl ResolutionLogEntry {
    pub fn new(
        strategy: ResolutionStrategy,
        conflict: ConflictRecord,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            key: conflict.key.clone(),
            strategy,
            choice: None,
            conflict,
            timestamp: now_millis(),
            device_id: device_id.into(),
        }
    }

    /// Sets the operator choice for a manual resolution
    pub fn with_choice(mut self, choice: ManualChoice) -> Self {
        self.choice = Some(choice);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::entry::MetadataOverrides;

    fn local() -> Entry {
        Entry::local(
            Key::parse("goal_1").unwrap(),
            json!({"title": "Run 5k"}),
            None,
            &MetadataOverrides::default(),
            "dev",
        )
    }

    #[test]
    fn test_strategy_parse_and_display() {
        for strategy in ResolutionStrategy::ALL {
            let parsed: ResolutionStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("keep_both".parse::<ResolutionStrategy>().is_err());
        assert_eq!(ResolutionStrategy::default(), ResolutionStrategy::ServerWins);
    }

    #[test]
    fn test_choice_parse() {
        assert_eq!("use_local".parse::<ManualChoice>().unwrap(), ManualChoice::UseLocal);
        assert_eq!("use_server".parse::<ManualChoice>().unwrap(), ManualChoice::UseServer);
        assert_eq!("use_custom".parse::<ManualChoice>().unwrap(), ManualChoice::UseCustom);
        assert!(matches!(
            "local".parse::<ManualChoice>(),
            Err(DomainError::InvalidChoice(_))
        ));
    }

    #[test]
    fn test_sync_failed_record() {
        let record = ConflictRecord::sync_failed(local(), Operation::Create, "timeout");

        assert_eq!(record.conflict_type, ConflictType::SyncFailed);
        assert_eq!(record.key.to_string(), "goal_1");
        assert!(record.remote_entry.is_none());
        assert_eq!(record.error.as_deref(), Some("timeout"));
        assert_eq!(record.operation, Some(Operation::Create));
        assert!(record.is_pending());
        assert!(!record.resolve().is_pending());
    }

    #[test]
    fn test_conflict_type_serializes_snake_case() {
        let value = serde_json::to_value(ConflictType::ConcurrentModification).unwrap();
        assert_eq!(value, json!("concurrent_modification"));

        let record = ConflictRecord::sync_failed(local(), Operation::Update, "boom");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["conflictType"], "sync_failed");
        assert_eq!(value["status"], "pending_manual_resolution");
    }

    #[test]
    fn test_log_entry_carries_choice() {
        let record = ConflictRecord::sync_failed(local(), Operation::Update, "boom");
        let log = ResolutionLogEntry::new(ResolutionStrategy::Manual, record, "dev")
            .with_choice(ManualChoice::UseServer);

        assert_eq!(log.key.to_string(), "goal_1");
        assert_eq!(log.choice, Some(ManualChoice::UseServer));
        assert_eq!(log.device_id, "dev");
    }
}
