//! Conflict detection logic
//!
//! Decides whether the server's view of a key disagrees with the local one
//! since the last successful sync. Detection is a pure function of its
//! inputs: the same entries and timestamp always yield the same answer.

use tracing::debug;

use offsync_core::domain::{ConflictRecord, ConflictType, Entry};

use crate::merge::PayloadMerger;

/// Result of conflict detection check
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    /// No conflict: the remote entry can simply become the local truth
    NoConflict,
    /// Conflict detected
    Conflicted(Box<ConflictRecord>),
}

impl DetectionResult {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DetectionResult::Conflicted(_))
    }

    /// The detected conflict type, if any
    pub fn conflict_type(&self) -> Option<ConflictType> {
        match self {
            DetectionResult::NoConflict => None,
            DetectionResult::Conflicted(record) => Some(record.conflict_type),
        }
    }
}

/// Detects conflicts between a local and a remote entry
pub struct ConflictDetector;

impl ConflictDetector {
    /// Compares `local` against `remote` relative to `last_sync` (epoch millis)
    ///
    /// 1. No local entry: no conflict.
    /// 2. Both sides modified after `last_sync`: `concurrent_modification`,
    ///    even when the payloads happen to be identical.
    /// 3. Payloads not equivalent according to `merger`: `data_difference`.
    /// 4. Otherwise no conflict.
    pub fn detect(
        local: Option<&Entry>,
        remote: &Entry,
        last_sync: i64,
        merger: &dyn PayloadMerger,
    ) -> DetectionResult {
        let Some(local) = local else {
            return DetectionResult::NoConflict;
        };

        let local_changed = local.metadata.last_modified > last_sync;
        let remote_changed = remote.metadata.last_modified > last_sync;

        let conflict_type = if local_changed && remote_changed {
            ConflictType::ConcurrentModification
        } else if !merger.equivalent(&local.data, &remote.data) {
            ConflictType::DataDifference
        } else {
            debug!(key = %local.key, "Local and remote entries agree");
            return DetectionResult::NoConflict;
        };

        debug!(
            key = %local.key,
            conflict_type = %conflict_type,
            local_modified = local.metadata.last_modified,
            remote_modified = remote.metadata.last_modified,
            last_sync,
            "Conflict detected"
        );

        DetectionResult::Conflicted(Box::new(ConflictRecord::detected(
            conflict_type,
            local.clone(),
            remote.clone(),
        )))
    }
}
