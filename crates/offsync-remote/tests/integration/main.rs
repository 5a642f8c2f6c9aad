//! Integration tests for offsync-remote
//!
//! Uses wiremock to simulate the backend and verifies the HTTP mapping of
//! the RemoteClient port and the reachability probe.

mod common;

mod test_client;
mod test_probe;
