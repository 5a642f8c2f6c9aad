//! offsync Core - Domain types and port definitions
//!
//! This crate is the hexagonal core of the offline synchronization engine:
//! - **Domain entities** - `Entry`, `Key`, `SyncQueueItem`, `ConflictRecord`, `ResolutionLogEntry`
//! - **Port definitions** - `KeyValueStore` (persistence) and `RemoteClient` (backend CRUD)
//! - **Configuration** - typed YAML configuration with defaults and validation
//!
//! # Architecture
//!
//! The domain module holds plain data and the small amount of logic that is
//! intrinsic to it (key parsing, version bumps, operation coalescing).
//! Ports define the trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod ports;
