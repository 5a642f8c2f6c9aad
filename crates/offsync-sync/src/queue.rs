//! Pending mutations awaiting transmission
//!
//! The queue keeps two lists:
//! - `live`: items waiting for the next drain; new mutations land here
//! - `in_flight`: the snapshot taken by the drain currently running
//!
//! The persisted form is always `in_flight ++ live`, so an interrupted drain
//! resumes with every unfinished item. Each key has at most one live item;
//! enqueueing for a key that is already pending coalesces into it.

use uuid::Uuid;

use offsync_core::domain::{Entry, Key, Operation, SyncQueueItem};

/// What happened to an item handed back after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// Back at the tail of the live queue
    Requeued,
    /// A newer mutation for the key was queued meanwhile and absorbed it
    Superseded,
    /// Retries exhausted; the item left the queue
    Exhausted(SyncQueueItem),
}

#[derive(Debug, Clone, Default)]
pub struct SyncQueue {
    live: Vec<SyncQueueItem>,
    in_flight: Vec<SyncQueueItem>,
}

impl SyncQueue {
    /// Rebuilds a queue from its persisted form
    pub fn from_items(items: Vec<SyncQueueItem>) -> Self {
        Self {
            live: items,
            in_flight: Vec::new(),
        }
    }

    /// Queues `entry` for `operation`, coalescing with a pending item for the key
    pub fn enqueue(&mut self, entry: Entry, operation: Operation) {
        match self.live.iter_mut().find(|item| item.key() == &entry.key) {
            Some(item) => {
                item.operation = item.operation.coalesce(operation);
                item.entry = entry;
                item.retry_count = 0;
                item.last_attempt_at = None;
                item.last_error = None;
            }
            None => self.live.push(SyncQueueItem::new(entry, operation)),
        }
    }

    /// Starts a drain, returning the items to process in order
    ///
    /// Leftovers of an interrupted drain come first. Items attempted less
    /// than `retry_delay_ms` before `now` stay queued for a later drain.
    pub fn begin_drain(&mut self, now: i64, retry_delay_ms: i64) -> Vec<SyncQueueItem> {
        let mut pending = std::mem::take(&mut self.in_flight);
        pending.append(&mut self.live);

        let (due, waiting): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|item| item.is_due(now, retry_delay_ms));

        self.live = waiting;
        self.in_flight = due;
        self.in_flight.clone()
    }

    /// Removes a finished in-flight item
    ///
    /// Returns `None` when the item is gone already (dropped by a
    /// resolution or a wipe), in which case its outcome must be ignored.
    pub fn complete(&mut self, id: Uuid) -> Option<SyncQueueItem> {
        let index = self.in_flight.iter().position(|item| item.id == id)?;
        Some(self.in_flight.remove(index))
    }

    /// Hands back an item whose delivery failed
    pub fn retry(&mut self, item: SyncQueueItem, max_retries: u32) -> RetryOutcome {
        if let Some(newer) = self.live.iter_mut().find(|live| live.key() == item.key()) {
            newer.operation = item.operation.coalesce(newer.operation);
            return RetryOutcome::Superseded;
        }

        if item.retry_count >= max_retries {
            return RetryOutcome::Exhausted(item);
        }

        self.live.push(item);
        RetryOutcome::Requeued
    }

    /// Removes every item for `key`, in flight or live
    pub fn drop_key(&mut self, key: &Key) -> Vec<SyncQueueItem> {
        let mut dropped = Vec::new();
        for list in [&mut self.in_flight, &mut self.live] {
            let (matching, kept): (Vec<_>, Vec<_>) =
                list.drain(..).partition(|item| item.key() == key);
            *list = kept;
            dropped.extend(matching);
        }
        dropped
    }

    /// All unfinished items in persisted order
    pub fn items(&self) -> impl Iterator<Item = &SyncQueueItem> {
        self.in_flight.iter().chain(self.live.iter())
    }

    pub fn len(&self) -> usize {
        self.in_flight.len() + self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use offsync_core::domain::MetadataOverrides;

    use super::*;

    fn entry(key: &str, data: Value) -> Entry {
        Entry::local(
            Key::parse(key).unwrap(),
            data,
            None,
            &MetadataOverrides::default(),
            "dev",
        )
    }

    fn keys(queue: &SyncQueue) -> Vec<String> {
        queue.items().map(|item| item.key().to_string()).collect()
    }

    #[test]
    fn test_enqueue_is_fifo() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);
        queue.enqueue(entry("b", json!(2)), Operation::Create);
        queue.enqueue(entry("c", json!(3)), Operation::Create);

        assert_eq!(keys(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_enqueue_coalesces_same_key() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);
        queue.enqueue(entry("b", json!(1)), Operation::Create);
        queue.enqueue(entry("a", json!(2)), Operation::Update);

        assert_eq!(keys(&queue), vec!["a", "b"]);
        let first = queue.items().next().unwrap();
        assert_eq!(first.operation, Operation::Create);
        assert_eq!(first.entry.data, json!(2));

        queue.enqueue(entry("a", json!(null)), Operation::Delete);
        assert_eq!(queue.items().next().unwrap().operation, Operation::Delete);
    }

    #[test]
    fn test_in_flight_items_stay_persisted() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);

        let batch = queue.begin_drain(0, 0);
        assert_eq!(batch.len(), 1);
        queue.enqueue(entry("b", json!(1)), Operation::Create);

        // Snapshot remainder first, then the live queue
        assert_eq!(keys(&queue), vec!["a", "b"]);

        queue.complete(batch[0].id).unwrap();
        assert_eq!(keys(&queue), vec!["b"]);
    }

    #[test]
    fn test_interrupted_drain_is_resumed_first() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);
        queue.begin_drain(0, 0);
        queue.enqueue(entry("b", json!(1)), Operation::Create);

        let batch = queue.begin_drain(0, 0);
        let order: Vec<_> = batch.iter().map(|i| i.key().to_string()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_not_due_items_wait() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);

        let mut item = queue.begin_drain(0, 0).remove(0);
        queue.complete(item.id).unwrap();
        item.record_failure("timeout");
        let attempted = item.last_attempt_at.unwrap();
        assert_eq!(queue.retry(item, 3), RetryOutcome::Requeued);

        assert!(queue.begin_drain(attempted + 1_000, 5_000).is_empty());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.begin_drain(attempted + 5_000, 5_000).len(), 1);
    }

    #[test]
    fn test_retry_exhausts_at_max() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);

        let mut item = queue.begin_drain(0, 0).remove(0);
        queue.complete(item.id);
        for _ in 0..3 {
            item.record_failure("boom");
        }

        assert!(matches!(queue.retry(item, 3), RetryOutcome::Exhausted(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retry_superseded_by_newer_item() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);
        let item = queue.begin_drain(0, 0).remove(0);

        queue.enqueue(entry("a", json!(2)), Operation::Update);
        let mut failed = queue.complete(item.id).unwrap();
        failed.record_failure("boom");

        assert_eq!(queue.retry(failed, 3), RetryOutcome::Superseded);
        assert_eq!(queue.len(), 1);
        let survivor = queue.items().next().unwrap();
        // The create never reached the server, so the newer item must create
        assert_eq!(survivor.operation, Operation::Create);
        assert_eq!(survivor.entry.data, json!(2));
        assert_eq!(survivor.retry_count, 0);
    }

    #[test]
    fn test_drop_key_covers_in_flight_and_live() {
        let mut queue = SyncQueue::default();
        queue.enqueue(entry("a", json!(1)), Operation::Create);
        queue.enqueue(entry("b", json!(1)), Operation::Create);
        let batch = queue.begin_drain(0, 0);
        queue.enqueue(entry("a", json!(2)), Operation::Update);

        let dropped = queue.drop_key(&Key::parse("a").unwrap());
        assert_eq!(dropped.len(), 2);
        assert_eq!(keys(&queue), vec!["b"]);
        assert!(queue.complete(batch[0].id).is_none());
    }
}
