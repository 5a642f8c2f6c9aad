//! Conflict resolution executor
//!
//! Applies the strategy selected for a key by performing the required
//! server calls:
//! - `ServerWins`: adopt the server entry, no server call
//! - `ClientWins`: push local data (or the local delete) and adopt the echo
//! - `Merge`: merge both payloads, push the result and adopt the echo
//! - `Manual`: park the record for an operator decision
//!
//! A failed push or an impossible merge never drops the conflict; the record
//! is handed back for manual resolution instead.

use std::sync::Arc;

use tracing::{info, warn};

use offsync_core::domain::{
    ConflictRecord, ConflictStatus, Entry, Key, ResolutionLogEntry, ResolutionStrategy, SyncStatus,
};
use offsync_core::ports::{RemoteClient, RemoteError};

use crate::detector::{ConflictDetector, DetectionResult};
use crate::error::ConflictError;
use crate::merge::MergeRegistry;
use crate::policy::StrategyPolicy;

/// Result of resolving one conflict
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// The conflict is settled; `entry` is the new local truth
    Resolved {
        entry: Entry,
        log: ResolutionLogEntry,
    },
    /// The conflict needs an operator decision
    Manual {
        record: ConflictRecord,
        /// Present when manual handling is the configured strategy
        log: Option<ResolutionLogEntry>,
        /// Why an automatic strategy fell back to manual handling
        reason: Option<String>,
    },
}

/// Detects and resolves conflicts using the configured strategies
pub struct ConflictResolver {
    remote: Arc<dyn RemoteClient>,
    policy: StrategyPolicy,
    mergers: MergeRegistry,
    device_id: String,
}

impl ConflictResolver {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        policy: StrategyPolicy,
        mergers: MergeRegistry,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            policy,
            mergers,
            device_id: device_id.into(),
        }
    }

    /// Runs detection using the merger registered for the remote entry's key
    pub fn detect(&self, local: Option<&Entry>, remote: &Entry, last_sync: i64) -> DetectionResult {
        let merger = self.mergers.merger_for(&remote.key);
        ConflictDetector::detect(local, remote, last_sync, merger)
    }

    /// Strategy applied to conflicts on `key`
    pub fn strategy_for(&self, key: &Key) -> ResolutionStrategy {
        self.policy.evaluate(key)
    }

    /// Resolves `record` with the strategy configured for its key
    pub async fn resolve(&self, record: ConflictRecord) -> ResolutionOutcome {
        let strategy = self.strategy_for(&record.key);
        info!(
            key = %record.key,
            conflict_type = %record.conflict_type,
            strategy = %strategy,
            "Resolving conflict"
        );

        let result = match strategy {
            ResolutionStrategy::ServerWins => self.server_wins(&record),
            ResolutionStrategy::ClientWins => self.client_wins(&record).await,
            ResolutionStrategy::Merge => self.merge(&record).await,
            ResolutionStrategy::Manual => {
                info!(key = %record.key, "Conflict parked for manual resolution");
                let log = ResolutionLogEntry::new(strategy, record.clone(), &self.device_id);
                return ResolutionOutcome::Manual {
                    record,
                    log: Some(log),
                    reason: None,
                };
            }
        };

        match result {
            Ok(entry) => {
                let entry = entry.with_conflict_status(ConflictStatus::Resolved);
                info!(
                    key = %record.key,
                    strategy = %strategy,
                    version = entry.metadata.version,
                    "Conflict resolved"
                );
                let log = ResolutionLogEntry::new(strategy, record.resolve(), &self.device_id);
                ResolutionOutcome::Resolved { entry, log }
            }
            Err(e) => {
                warn!(
                    key = %record.key,
                    strategy = %strategy,
                    error = %e,
                    "Automatic resolution failed, falling back to manual"
                );
                ResolutionOutcome::Manual {
                    record,
                    log: None,
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    fn server_wins(&self, record: &ConflictRecord) -> Result<Entry, ConflictError> {
        remote_entry(record).cloned()
    }

    async fn client_wins(&self, record: &ConflictRecord) -> Result<Entry, ConflictError> {
        let local = &record.local_entry;
        let endpoint = record.key.endpoint();

        if local.deleted {
            match self.remote.delete(&endpoint).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            let mut tombstone = local.clone();
            tombstone.sync_status = SyncStatus::Synced;
            return Ok(tombstone);
        }

        let echo = self.remote.update(&endpoint, &local.data).await?;
        Ok(echo.into_entry(record.key.clone(), Some(local), &self.device_id))
    }

    async fn merge(&self, record: &ConflictRecord) -> Result<Entry, ConflictError> {
        let local = &record.local_entry;
        let remote = remote_entry(record)?;

        let merged = if local.deleted {
            None
        } else {
            self.mergers
                .merger_for(&record.key)
                .merge(&local.data, &remote.data)
        };
        let merged = merged.ok_or_else(|| ConflictError::NotMergeable(record.key.to_string()))?;

        let echo = self.remote.update(&record.key.endpoint(), &merged).await?;
        Ok(echo.into_entry(record.key.clone(), Some(local), &self.device_id))
    }
}

fn remote_entry(record: &ConflictRecord) -> Result<&Entry, ConflictError> {
    record
        .remote_entry
        .as_ref()
        .ok_or_else(|| ConflictError::MissingRemote(record.key.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use offsync_core::config::StrategyRule;
    use offsync_core::domain::{ConflictType, MetadataOverrides, Operation};
    use offsync_core::ports::RemoteRecord;

    use super::*;

    /// Echoes writes back with a bumped version; optionally fails them
    #[derive(Default)]
    struct EchoRemote {
        fail: bool,
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl EchoRemote {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, String, Value)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, op: &str, endpoint: &str, data: Value) -> Result<(), RemoteError> {
            self.calls
                .lock()
                .unwrap()
                .push((op.to_string(), endpoint.to_string(), data));
            if self.fail {
                Err(RemoteError::Network("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl RemoteClient for EchoRemote {
        async fn create(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
            self.record("create", endpoint, data.clone())?;
            Ok(RemoteRecord::new(data.clone()).with_version(1).with_last_modified(500))
        }

        async fn read(&self, endpoint: &str) -> Result<RemoteRecord, RemoteError> {
            self.record("read", endpoint, Value::Null)?;
            Err(RemoteError::NotFound(endpoint.to_string()))
        }

        async fn update(&self, endpoint: &str, data: &Value) -> Result<RemoteRecord, RemoteError> {
            self.record("update", endpoint, data.clone())?;
            Ok(RemoteRecord::new(data.clone()).with_version(42).with_last_modified(500))
        }

        async fn delete(&self, endpoint: &str) -> Result<(), RemoteError> {
            self.record("delete", endpoint, Value::Null)
        }
    }

    fn key() -> Key {
        Key::parse("goal_1").unwrap()
    }

    fn conflict(local: Value, remote: Value) -> ConflictRecord {
        let overrides = MetadataOverrides {
            last_modified: Some(100),
            source: None,
        };
        let local = Entry::local(key(), local, None, &overrides, "dev");
        let remote = Entry::server(key(), remote, 7, 150, "dev");
        ConflictRecord::detected(ConflictType::ConcurrentModification, local, remote)
    }

    fn resolver(remote: Arc<EchoRemote>, strategy: ResolutionStrategy) -> ConflictResolver {
        ConflictResolver::new(
            remote,
            StrategyPolicy::uniform(strategy),
            MergeRegistry::new(),
            "dev",
        )
    }

    #[tokio::test]
    async fn test_server_wins_adopts_remote() {
        let remote = Arc::new(EchoRemote::default());
        let resolver = resolver(remote.clone(), ResolutionStrategy::ServerWins);

        let outcome = resolver
            .resolve(conflict(json!({"title": "Run 5k"}), json!({"title": "Run 10k"})))
            .await;

        let ResolutionOutcome::Resolved { entry, log } = outcome else {
            panic!("expected resolution");
        };
        assert_eq!(entry.data, json!({"title": "Run 10k"}));
        assert_eq!(entry.conflict_status, ConflictStatus::Resolved);
        assert_eq!(log.strategy, ResolutionStrategy::ServerWins);
        assert!(!log.conflict.is_pending());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_client_wins_pushes_local_and_adopts_echo() {
        let remote = Arc::new(EchoRemote::default());
        let resolver = resolver(remote.clone(), ResolutionStrategy::ClientWins);

        let outcome = resolver
            .resolve(conflict(json!({"title": "Run 5k"}), json!({"title": "Run 10k"})))
            .await;

        assert_eq!(
            remote.calls(),
            vec![(
                "update".to_string(),
                "/goal_1".to_string(),
                json!({"title": "Run 5k"})
            )]
        );
        let ResolutionOutcome::Resolved { entry, .. } = outcome else {
            panic!("expected resolution");
        };
        assert_eq!(entry.data, json!({"title": "Run 5k"}));
        assert_eq!(entry.metadata.version, 42);
        assert_eq!(entry.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_client_wins_tombstone_pushes_delete() {
        let remote = Arc::new(EchoRemote::default());
        let resolver = resolver(remote.clone(), ResolutionStrategy::ClientWins);

        let mut record = conflict(json!(null), json!({"title": "Run 10k"}));
        record.local_entry = Entry::tombstone(key(), None, "dev");

        let outcome = resolver.resolve(record).await;
        assert_eq!(remote.calls()[0].0, "delete");
        let ResolutionOutcome::Resolved { entry, .. } = outcome else {
            panic!("expected resolution");
        };
        assert!(entry.deleted);
    }

    #[tokio::test]
    async fn test_client_wins_push_failure_falls_back_to_manual() {
        let remote = Arc::new(EchoRemote::failing());
        let resolver = resolver(remote, ResolutionStrategy::ClientWins);

        let record = conflict(json!({"title": "Run 5k"}), json!({"title": "Run 10k"}));
        let outcome = resolver.resolve(record.clone()).await;

        let ResolutionOutcome::Manual {
            record: parked,
            log,
            reason,
        } = outcome
        else {
            panic!("expected manual fallback");
        };
        assert_eq!(parked, record);
        assert!(log.is_none());
        assert!(reason.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_merge_pushes_merged_payload() {
        let remote = Arc::new(EchoRemote::default());
        let resolver = resolver(remote.clone(), ResolutionStrategy::Merge);

        let outcome = resolver
            .resolve(conflict(
                json!({"title": "Run 5k", "color": "blue"}),
                json!({"title": "Run 10k", "pace": "6:00"}),
            ))
            .await;

        let expected = json!({"title": "Run 5k", "pace": "6:00", "color": "blue", "_merged": true});
        assert_eq!(remote.calls()[0].2, expected);
        let ResolutionOutcome::Resolved { entry, log } = outcome else {
            panic!("expected resolution");
        };
        assert_eq!(entry.data, expected);
        assert_eq!(log.strategy, ResolutionStrategy::Merge);
    }

    #[tokio::test]
    async fn test_merge_of_scalars_falls_back_to_manual() {
        let remote = Arc::new(EchoRemote::default());
        let resolver = resolver(remote.clone(), ResolutionStrategy::Merge);

        let outcome = resolver.resolve(conflict(json!(5), json!(6))).await;

        assert!(matches!(
            outcome,
            ResolutionOutcome::Manual { log: None, reason: Some(_), .. }
        ));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_manual_parks_with_log() {
        let remote = Arc::new(EchoRemote::default());
        let resolver = resolver(remote.clone(), ResolutionStrategy::Manual);

        let outcome = resolver.resolve(conflict(json!(1), json!(2))).await;

        let ResolutionOutcome::Manual { record, log, reason } = outcome else {
            panic!("expected manual");
        };
        assert!(record.is_pending());
        assert_eq!(log.unwrap().strategy, ResolutionStrategy::Manual);
        assert!(reason.is_none());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_server_wins_without_snapshot_falls_back_to_manual() {
        let remote = Arc::new(EchoRemote::default());
        let resolver = resolver(remote, ResolutionStrategy::ServerWins);

        let local = Entry::local(key(), json!(1), None, &MetadataOverrides::default(), "dev");
        let record = ConflictRecord::sync_failed(local, Operation::Update, "timeout");

        let outcome = resolver.resolve(record).await;
        assert!(matches!(outcome, ResolutionOutcome::Manual { log: None, .. }));
    }

    #[test]
    fn test_strategy_rules_apply_per_key() {
        let rules = vec![StrategyRule {
            pattern: "note_*".to_string(),
            strategy: ResolutionStrategy::Merge,
        }];
        let resolver = ConflictResolver::new(
            Arc::new(EchoRemote::default()),
            StrategyPolicy::new(ResolutionStrategy::ServerWins, &rules),
            MergeRegistry::new(),
            "dev",
        );

        assert_eq!(
            resolver.strategy_for(&Key::parse("note_1").unwrap()),
            ResolutionStrategy::Merge
        );
        assert_eq!(resolver.strategy_for(&key()), ResolutionStrategy::ServerWins);
    }
}
