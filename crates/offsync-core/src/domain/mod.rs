//! Domain entities and business logic
//!
//! This module contains the core domain types for offsync:
//! - Logical keys and their endpoint mapping
//! - Versioned entries and their sync metadata
//! - Queued mutations
//! - Conflict records, strategies and the resolution log
//! - Domain-specific error types

pub mod conflict;
pub mod entry;
pub mod errors;
pub mod key;
pub mod queue;

// Re-export commonly used types
pub use conflict::{
    ConflictRecord, ConflictState, ConflictType, ManualChoice, ResolutionLogEntry,
    ResolutionStrategy, RESOLUTION_LOG_CAPACITY,
};
pub use entry::{
    now_millis, ConflictStatus, Entry, EntryMetadata, EntrySource, MetadataOverrides, SyncStatus,
};
pub use errors::DomainError;
pub use key::Key;
pub use queue::{Operation, SyncQueueItem};
