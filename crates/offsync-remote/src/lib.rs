//! offsync Remote - Backend adapters
//!
//! Provides:
//! - [`HttpRemoteClient`], the JSON-over-HTTP implementation of the
//!   `RemoteClient` port
//! - [`HttpProbe`], a background task that reports backend reachability

pub mod client;
pub mod probe;

pub use client::HttpRemoteClient;
pub use probe::HttpProbe;
