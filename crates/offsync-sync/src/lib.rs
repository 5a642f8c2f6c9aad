//! offsync Sync - Offline-first synchronization engine
//!
//! Provides:
//! - Durable local state that survives restarts
//! - A coalescing queue of pending mutations with retry bookkeeping
//! - Reconnect and periodic drains, never more than one at a time
//! - Conflict detection and resolution on server disagreement
//!
//! ## Modules
//!
//! - [`engine`] - The [`SyncEngine`] handle applications talk to
//! - [`coordinator`] - Drains the queue and routes conflicts
//! - [`network`] - Connectivity state and transition events
//! - [`persistence`] - Typed load/save of engine state over a key/value store

pub mod conflict_queue;
pub mod coordinator;
pub mod engine;
pub mod network;
pub mod offline_store;
pub mod persistence;
pub mod queue;
pub mod remote;

mod state;

use thiserror::Error;

use offsync_core::domain::DomainError;
use offsync_core::ports::RemoteError;

pub use coordinator::{DrainOutcome, DrainSummary, SkipReason};
pub use engine::{EngineStatus, SyncEngine, SyncEngineBuilder};
pub use network::{ConnectivityHandle, NetworkEvent, NetworkMonitor};

/// Errors surfaced by the engine
///
/// Transient delivery failures and conflicts are handled internally and
/// never appear here; persistence failures always do.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Durable storage could not be read or written
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),

    /// A caller-supplied key or choice was rejected
    #[error(transparent)]
    InvalidKey(#[from] DomainError),

    /// `resolve_manually` was called for a key with no pending conflict
    #[error("no pending conflict for key {0}")]
    ConflictNotFound(String),

    /// The local entry a resolution depends on no longer exists
    #[error("no local entry for key {0}")]
    MissingLocalEntry(String),

    /// `use_custom` was chosen without data
    #[error("use_custom resolution requires data")]
    CustomDataRequired,

    /// A server call required by an operator action failed
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// An operator action needs the server but the engine is offline
    #[error("{0} requires a reachable server")]
    Offline(&'static str),

    /// The sync settings cannot drive the coordinator
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),
}
