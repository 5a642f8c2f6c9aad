//! Pending mutations awaiting transmission to the server

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::{now_millis, Entry};
use super::key::Key;

/// Remote operation a queued mutation maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Combines a still-pending operation with a newer one for the same key
    ///
    /// The result is the single operation that moves the server from the
    /// state before `self` to the state after `newer`.
    #[must_use]
    pub fn coalesce(self, newer: Operation) -> Operation {
        match (self, newer) {
            (Operation::Create, Operation::Update) => Operation::Create,
            (_, Operation::Delete) => Operation::Delete,
            (Operation::Delete, Operation::Create) => Operation::Update,
            (Operation::Update, Operation::Create) => Operation::Update,
            (_, newer) => newer,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// A queued mutation with retry bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: Uuid,
    pub entry: Entry,
    pub operation: Operation,
    pub retry_count: u32,
    pub enqueued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncQueueItem {
    pub fn new(entry: Entry, operation: Operation) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry,
            operation,
            retry_count: 0,
            enqueued_at: now_millis(),
            last_attempt_at: None,
            last_error: None,
        }
    }

    pub fn key(&self) -> &Key {
        &self.entry.key
    }

    /// Records a failed delivery attempt
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_attempt_at = Some(now_millis());
        self.last_error = Some(error.into());
    }

    /// True when the item may be attempted at `now` given the retry spacing
    pub fn is_due(&self, now: i64, retry_delay_ms: i64) -> bool {
        match self.last_attempt_at {
            Some(last) => now - last >= retry_delay_ms,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::entry::MetadataOverrides;

    fn item() -> SyncQueueItem {
        let entry = Entry::local(
            Key::parse("note_1").unwrap(),
            json!({"body": "x"}),
            None,
            &MetadataOverrides::default(),
            "dev",
        );
        SyncQueueItem::new(entry, Operation::Create)
    }

    #[test]
    fn test_coalesce_table() {
        use Operation::*;
        assert_eq!(Create.coalesce(Update), Create);
        assert_eq!(Create.coalesce(Delete), Delete);
        assert_eq!(Update.coalesce(Update), Update);
        assert_eq!(Update.coalesce(Delete), Delete);
        assert_eq!(Delete.coalesce(Create), Update);
        assert_eq!(Delete.coalesce(Update), Update);
    }

    #[test]
    fn test_record_failure_tracks_attempt() {
        let mut item = item();
        assert!(item.is_due(0, 5_000));

        item.record_failure("connection refused");
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.last_error.as_deref(), Some("connection refused"));

        let last = item.last_attempt_at.unwrap();
        assert!(!item.is_due(last + 1_000, 5_000));
        assert!(item.is_due(last + 5_000, 5_000));
        assert!(item.is_due(last, 0));
    }

    #[test]
    fn test_serialized_shape() {
        let item = item();
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["operation"], "create");
        assert_eq!(value["retryCount"], 0);
        assert!(value.get("lastError").is_none());
    }
}
