//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the engine depends on but whose implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`KeyValueStore`] - Durable key/value storage for the engine's bookkeeping
//! - [`RemoteClient`] - Generic CRUD against the backend, addressed by endpoint

pub mod key_value_store;
pub mod remote_client;

pub use key_value_store::KeyValueStore;
pub use remote_client::{RemoteClient, RemoteError, RemoteRecord};
