//! Shared test helpers for backend integration tests
//!
//! Each helper starts a wiremock server and returns a client pointing at it.

use std::time::Duration;

use wiremock::MockServer;

use offsync_remote::HttpRemoteClient;

/// Request timeout used by test clients
pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Starts a mock backend and returns a (MockServer, HttpRemoteClient) tuple.
pub async fn setup_backend_mock() -> (MockServer, HttpRemoteClient) {
    let server = MockServer::start().await;
    let client = HttpRemoteClient::new(server.uri(), TEST_TIMEOUT)
        .expect("Failed to build client")
        .with_bearer_token("test-token");
    (server, client)
}
