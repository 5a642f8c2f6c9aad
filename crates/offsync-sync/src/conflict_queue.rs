//! Conflicts awaiting an operator decision, and the resolution log

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use offsync_core::domain::{
    ConflictRecord, Entry, Key, Operation, ResolutionLogEntry, RESOLUTION_LOG_CAPACITY,
};

/// Pending conflict records, at most one per key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictQueue {
    records: Vec<ConflictRecord>,
}

impl ConflictQueue {
    /// Adds `record`, replacing an older record for the same key
    pub fn push(&mut self, record: ConflictRecord) {
        self.records.retain(|existing| existing.key != record.key);
        self.records.push(record);
    }

    pub fn get(&self, key: &Key) -> Option<&ConflictRecord> {
        self.records.iter().find(|record| &record.key == key)
    }

    /// True while `key` has a record awaiting a decision
    pub fn is_parked(&self, key: &Key) -> bool {
        self.get(key).is_some_and(ConflictRecord::is_pending)
    }

    /// Folds a newer local write into the pending record for its key
    ///
    /// The record's local side becomes `entry` and its operation coalesces
    /// with `operation`. Returns false when the key is not parked.
    pub fn absorb(&mut self, entry: &Entry, operation: Operation) -> bool {
        let Some(record) = self
            .records
            .iter_mut()
            .find(|record| record.key == entry.key && record.is_pending())
        else {
            return false;
        };
        record.local_entry = entry.clone();
        record.operation = Some(record.operation.map_or(operation, |older| older.coalesce(operation)));
        true
    }

    pub fn remove(&mut self, key: &Key) -> Option<ConflictRecord> {
        let index = self.records.iter().position(|record| &record.key == key)?;
        Some(self.records.remove(index))
    }

    pub fn records(&self) -> &[ConflictRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Append-only resolution history, capped at the most recent entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionLog {
    entries: VecDeque<ResolutionLogEntry>,
}

impl ResolutionLog {
    /// Appends `entry`, evicting the oldest entries beyond capacity
    pub fn push(&mut self, entry: ResolutionLogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > RESOLUTION_LOG_CAPACITY {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ResolutionLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
