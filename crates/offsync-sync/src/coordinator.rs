//! Sync coordinator - drains the queue and routes conflicts
//!
//! ## Drain
//!
//! 1. Take a snapshot of the due queue items (mutations stored meanwhile
//!    queue behind it)
//! 2. Dispatch each item to the server in order
//! 3. Apply the outcome: adopt the echo, retry later, escalate after the
//!    configured number of failures, or run the conflict pipeline on a
//!    server-side conflict
//!
//! At most one drain runs at a time; a trigger that arrives during a drain
//! is a no-op.
//!
//! ## Triggers
//!
//! [`SyncCoordinator::run`] selects over shutdown, connectivity events and a
//! periodic timer. A reconnect drains after a settle delay; transitions
//! observed while that drain ran are ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use offsync_conflict::{ConflictResolver, DetectionResult, ResolutionOutcome};
use offsync_core::config::SyncConfig;
use offsync_core::domain::{
    now_millis, ConflictRecord, ConflictStatus, Entry, Operation, SyncQueueItem, SyncStatus,
};
use offsync_core::ports::{RemoteClient, RemoteError, RemoteRecord};

use crate::network::{NetworkEvent, NetworkEvents, NetworkMonitor};
use crate::persistence::Section;
use crate::queue::RetryOutcome;
use crate::state::SharedState;
use crate::EngineError;

/// Why a drain did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another drain is in progress
    AlreadyRunning,
    /// The network is down
    Offline,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::AlreadyRunning => "already running",
            SkipReason::Offline => "offline",
        };
        write!(f, "{}", s)
    }
}

/// Counters for one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainSummary {
    /// Items dispatched to the server
    pub attempted: usize,
    /// Items delivered and acknowledged
    pub synced: usize,
    /// Items that failed and stay queued
    pub retried: usize,
    /// Items moved to the conflict queue after exhausting retries
    pub escalated: usize,
    /// Items the server rejected as conflicting
    pub conflicts: usize,
    /// Items whose outcome was ignored because they left the queue meanwhile
    pub discarded: usize,
    /// Items left queued because their retry delay had not elapsed
    pub deferred: usize,
    /// Connectivity was lost before the snapshot was exhausted
    pub interrupted: bool,
    pub duration_ms: u64,
}

impl DrainSummary {
    /// True when every pending mutation was delivered or settled
    pub fn is_clean(&self) -> bool {
        !self.interrupted && self.retried == 0 && self.escalated == 0 && self.deferred == 0
    }
}

/// Result of a drain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    Completed(DrainSummary),
}

/// Clears the drain flag when dropped, whatever way the drain ends
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// True when the local entry is still the revision observed before a remote call
fn unchanged(current: Option<&Entry>, snapshot: Option<&Entry>) -> bool {
    match (current, snapshot) {
        (Some(current), Some(snapshot)) => current.same_revision(snapshot),
        (None, None) => true,
        _ => false,
    }
}

/// Orchestrates queue drains and the conflict pipeline
pub struct SyncCoordinator {
    state: Arc<SharedState>,
    remote: Arc<dyn RemoteClient>,
    resolver: ConflictResolver,
    network: NetworkMonitor,
    config: SyncConfig,
    device_id: String,
    draining: AtomicBool,
}

impl SyncCoordinator {
    pub(crate) fn new(
        state: Arc<SharedState>,
        remote: Arc<dyn RemoteClient>,
        resolver: ConflictResolver,
        network: NetworkMonitor,
        config: SyncConfig,
        device_id: String,
    ) -> Self {
        Self {
            state,
            remote,
            resolver,
            network,
            config,
            device_id,
            draining: AtomicBool::new(false),
        }
    }

    /// Whether a drain is currently running
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    // ========================================================================
    // Drain
    // ========================================================================

    /// Runs one drain of the sync queue
    ///
    /// Returns [`DrainOutcome::Skipped`] without touching the queue when a
    /// drain is already running or the network is down. Only persistence
    /// failures are errors.
    pub async fn drain(&self) -> Result<DrainOutcome, EngineError> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            debug!("Drain already in progress, skipping");
            return Ok(DrainOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        if !self.network.is_online() {
            debug!("Offline, skipping drain");
            return Ok(DrainOutcome::Skipped(SkipReason::Offline));
        }

        let started = Instant::now();
        let now = now_millis();
        let retry_delay_ms = i64::try_from(self.config.retry_delay().as_millis()).unwrap_or(i64::MAX);

        let (batch, deferred) = self
            .state
            .commit(&[Section::SyncQueue], |s| {
                let batch = s.queue.begin_drain(now, retry_delay_ms);
                let deferred = s.queue.len() - batch.len();
                (batch, deferred)
            })
            .await?;

        info!(items = batch.len(), deferred, "Drain started");

        let mut summary = DrainSummary {
            deferred,
            ..DrainSummary::default()
        };

        for item in batch {
            if !self.network.is_online() {
                info!("Connectivity lost, stopping drain");
                summary.interrupted = true;
                break;
            }
            summary.attempted += 1;
            self.process_item(item, &mut summary).await?;
        }

        if summary.is_clean() {
            let finished = now_millis();
            self.state
                .commit(&[Section::LastSync], |s| s.last_sync = finished)
                .await?;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            attempted = summary.attempted,
            synced = summary.synced,
            retried = summary.retried,
            escalated = summary.escalated,
            conflicts = summary.conflicts,
            duration_ms = summary.duration_ms,
            "Drain finished"
        );

        Ok(DrainOutcome::Completed(summary))
    }

    async fn process_item(
        &self,
        item: SyncQueueItem,
        summary: &mut DrainSummary,
    ) -> Result<(), EngineError> {
        debug!(
            key = %item.key(),
            operation = %item.operation,
            retry_count = item.retry_count,
            "Processing queued mutation"
        );

        match self.dispatch(&item).await {
            Ok(echo) => {
                if self.apply_success(&item, echo).await? {
                    summary.synced += 1;
                } else {
                    summary.discarded += 1;
                }
            }
            Err(RemoteError::Conflict { current }) => {
                summary.conflicts += 1;
                self.handle_server_conflict(&item, current, summary).await?;
            }
            Err(e) => self.apply_failure(&item, e, summary).await?,
        }
        Ok(())
    }

    /// Sends one queued mutation; `None` means the resource is gone
    async fn dispatch(&self, item: &SyncQueueItem) -> Result<Option<RemoteRecord>, RemoteError> {
        let endpoint = item.key().endpoint();
        let data = &item.entry.data;

        match item.operation {
            Operation::Create => self.remote.create(&endpoint, data).await.map(Some),
            Operation::Update => match self.remote.update(&endpoint, data).await {
                Err(RemoteError::NotFound(_)) => {
                    debug!(endpoint = %endpoint, "Resource missing on server, creating it");
                    self.remote.create(&endpoint, data).await.map(Some)
                }
                other => other.map(Some),
            },
            Operation::Delete => match self.remote.delete(&endpoint).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Applies an acknowledged mutation; returns false if the item was gone
    async fn apply_success(
        &self,
        item: &SyncQueueItem,
        echo: Option<RemoteRecord>,
    ) -> Result<bool, EngineError> {
        let key = item.key().clone();
        let device_id = self.device_id.as_str();

        self.state
            .commit(&[Section::OfflineData, Section::SyncQueue], |s| {
                if s.queue.complete(item.id).is_none() {
                    return false;
                }

                let current = s.store.get(&key).cloned();
                if !unchanged(current.as_ref(), Some(&item.entry)) {
                    debug!(key = %key, "Local entry changed during sync, keeping newer write");
                    return true;
                }

                match echo {
                    Some(record) => {
                        s.store
                            .put(record.into_entry(key.clone(), current.as_ref(), device_id));
                    }
                    None => {
                        s.store.remove(&key);
                    }
                }
                true
            })
            .await
    }

    async fn apply_failure(
        &self,
        item: &SyncQueueItem,
        error: RemoteError,
        summary: &mut DrainSummary,
    ) -> Result<(), EngineError> {
        let message = error.to_string();
        let max_retries = self.config.max_retries;

        let outcome = self
            .state
            .commit(
                &[Section::OfflineData, Section::SyncQueue, Section::ConflictQueue],
                |s| -> Option<RetryOutcome> {
                    let mut failed = s.queue.complete(item.id)?;
                    failed.record_failure(message.clone());
                    let key = failed.key().clone();

                    let outcome = s.queue.retry(failed, max_retries);
                    if let Some(entry) = s
                        .store
                        .get_mut(&key)
                        .filter(|entry| entry.same_revision(&item.entry))
                    {
                        entry.sync_status = SyncStatus::Failed;
                        if matches!(outcome, RetryOutcome::Exhausted(_)) {
                            entry.conflict_status = ConflictStatus::Detected;
                        }
                    }

                    if let RetryOutcome::Exhausted(exhausted) = &outcome {
                        s.conflicts.push(ConflictRecord::sync_failed(
                            exhausted.entry.clone(),
                            exhausted.operation,
                            message.clone(),
                        ));
                    }
                    Some(outcome)
                },
            )
            .await?;

        match outcome {
            None => summary.discarded += 1,
            Some(RetryOutcome::Requeued) => {
                summary.retried += 1;
                warn!(
                    key = %item.key(),
                    retry_count = item.retry_count + 1,
                    transient = error.is_transient(),
                    error = %message,
                    "Delivery failed, will retry"
                );
            }
            Some(RetryOutcome::Superseded) => {
                summary.retried += 1;
                debug!(key = %item.key(), error = %message, "Delivery failed, newer mutation queued");
            }
            Some(RetryOutcome::Exhausted(exhausted)) => {
                summary.escalated += 1;
                warn!(
                    key = %exhausted.key(),
                    retry_count = exhausted.retry_count,
                    error = %message,
                    "Retries exhausted, escalated to conflict queue"
                );
            }
        }
        Ok(())
    }

    async fn handle_server_conflict(
        &self,
        item: &SyncQueueItem,
        current: Option<RemoteRecord>,
        summary: &mut DrainSummary,
    ) -> Result<(), EngineError> {
        let server = match current {
            Some(record) => record,
            None => match self.remote.read(&item.key().endpoint()).await {
                Ok(record) => record,
                Err(e) => return self.apply_failure(item, e, summary).await,
            },
        };

        info!(key = %item.key(), "Server reported a conflicting revision");
        let remote_entry = server.into_entry(item.key().clone(), Some(&item.entry), &self.device_id);
        let last_sync = self.state.read(|s| s.last_sync).await;

        match self.resolver.detect(Some(&item.entry), &remote_entry, last_sync) {
            DetectionResult::NoConflict => {
                self.adopt_remote(remote_entry, Some(&item.entry), Some(item.id))
                    .await?;
            }
            DetectionResult::Conflicted(record) => {
                self.apply_resolution(*record, Some(&item.entry), Some(item.id))
                    .await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Conflict pipeline
    // ========================================================================

    /// Reconciles a fresh server read with the local entry observed before it
    ///
    /// A local entry with no unsynchronized changes simply takes the server
    /// version. Returns the resulting local entry.
    pub(crate) async fn reconcile(
        &self,
        snapshot: Option<Entry>,
        remote_entry: Entry,
    ) -> Result<Option<Entry>, EngineError> {
        let last_sync = self.state.read(|s| s.last_sync).await;
        // A synced copy holds nothing unsent, so it never conflicts
        let candidate = snapshot
            .as_ref()
            .filter(|local| local.sync_status != SyncStatus::Synced);

        match self.resolver.detect(candidate, &remote_entry, last_sync) {
            DetectionResult::NoConflict => {
                self.adopt_remote(remote_entry, snapshot.as_ref(), None)
                    .await
            }
            DetectionResult::Conflicted(record) => {
                self.apply_resolution(*record, snapshot.as_ref(), None)
                    .await
            }
        }
    }

    /// Stores the server entry unless the local entry changed meanwhile
    async fn adopt_remote(
        &self,
        remote_entry: Entry,
        snapshot: Option<&Entry>,
        item_id: Option<Uuid>,
    ) -> Result<Option<Entry>, EngineError> {
        let key = remote_entry.key.clone();
        self.state
            .commit(&[Section::OfflineData, Section::SyncQueue], |s| {
                if let Some(id) = item_id {
                    s.queue.complete(id);
                }

                let current = s.store.get(&key).cloned();
                if unchanged(current.as_ref(), snapshot) {
                    s.store.put(remote_entry.clone());
                    Some(remote_entry)
                } else {
                    current
                }
            })
            .await
    }

    /// Resolves `record` and applies the outcome
    ///
    /// `snapshot` is the local entry the conflict was detected against and
    /// `item_id` the in-flight queue item that hit it, if any. Returns the
    /// resulting local entry.
    async fn apply_resolution(
        &self,
        record: ConflictRecord,
        snapshot: Option<&Entry>,
        item_id: Option<Uuid>,
    ) -> Result<Option<Entry>, EngineError> {
        let key = record.key.clone();

        match self.resolver.resolve(record).await {
            ResolutionOutcome::Resolved { entry, log } => {
                self.state
                    .commit(&Section::ALL, |s| {
                        if let Some(id) = item_id {
                            s.queue.complete(id);
                        }
                        s.logs.push(log);

                        let current = s.store.get(&key).cloned();
                        if !unchanged(current.as_ref(), snapshot) {
                            debug!(key = %key, "Local entry changed during resolution, keeping newer write");
                            return current;
                        }

                        s.queue.drop_key(&key);
                        s.conflicts.remove(&key);
                        if entry.deleted {
                            s.store.remove(&key);
                            None
                        } else {
                            s.store.put(entry.clone());
                            Some(entry)
                        }
                    })
                    .await
            }
            ResolutionOutcome::Manual {
                mut record,
                log,
                reason,
            } => {
                self.state
                    .commit(&Section::ALL, |s| {
                        let dropped = s.queue.drop_key(&key);
                        let pending = dropped
                            .iter()
                            .map(|item| item.operation)
                            .reduce(|older, newer| older.coalesce(newer));
                        let parked = s
                            .conflicts
                            .get(&key)
                            .filter(|existing| existing.is_pending())
                            .and_then(|existing| existing.operation);
                        record.operation = record.operation.or(pending).or(parked);
                        if reason.is_some() {
                            record.error = reason;
                        }

                        if let Some(entry) = s.store.get_mut(&key) {
                            entry.conflict_status = ConflictStatus::Detected;
                            record.local_entry = entry.clone();
                        }

                        info!(key = %key, conflict_type = %record.conflict_type, "Conflict queued for manual resolution");
                        s.conflicts.push(record);
                        if let Some(log) = log {
                            s.logs.push(log);
                        }
                        s.store.get(&key).cloned()
                    })
                    .await
            }
        }
    }

    // ========================================================================
    // Trigger loop
    // ========================================================================

    /// Drains on reconnect and on the periodic timer until `cancel` fires
    pub async fn run(self: Arc<Self>, mut events: NetworkEvents, cancel: CancellationToken) {
        info!(
            settle_ms = self.config.settle_delay().as_millis() as u64,
            interval_secs = self.config.periodic_interval_secs,
            "Sync coordinator starting"
        );

        let mut ticker = tokio::time::interval(self.config.periodic_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        let mut events_open = true;

        'run: loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'run,

                event = events.next(), if events_open => match event {
                    Some(NetworkEvent::Connected) => {
                        info!("Connectivity restored");
                        tokio::select! {
                            _ = cancel.cancelled() => break 'run,
                            _ = tokio::time::sleep(self.config.settle_delay()) => {}
                        }

                        if self.network.is_online() {
                            tokio::select! {
                                _ = cancel.cancelled() => break 'run,
                                _ = self.drain_in_background("reconnect") => {}
                            }
                            ticker.reset();
                        }
                        events.mark_seen();
                    }
                    Some(NetworkEvent::Disconnected) => info!("Connectivity lost"),
                    None => {
                        debug!("Connectivity source closed");
                        events_open = false;
                    }
                },

                _ = ticker.tick() => {
                    if self.network.is_online() {
                        tokio::select! {
                            _ = cancel.cancelled() => break 'run,
                            _ = self.drain_in_background("periodic") => {}
                        }
                        // Next periodic drain is a full interval after this one ends
                        ticker.reset();
                    }
                }
            }
        }

        info!("Sync coordinator stopped");
    }

    async fn drain_in_background(&self, trigger: &'static str) {
        match self.drain().await {
            Ok(DrainOutcome::Completed(summary)) => {
                debug!(trigger, synced = summary.synced, "Background drain completed");
            }
            Ok(DrainOutcome::Skipped(reason)) => {
                debug!(trigger, reason = %reason, "Background drain skipped");
            }
            Err(e) => error!(trigger, error = %e, "Background drain failed"),
        }
    }
}
