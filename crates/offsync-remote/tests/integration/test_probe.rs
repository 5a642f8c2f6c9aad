//! Integration tests for HttpProbe

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use offsync_remote::HttpProbe;

fn probe(server: &MockServer) -> HttpProbe {
    HttpProbe::new(
        &server.uri(),
        "/health",
        Duration::from_millis(50),
        Duration::from_millis(500),
    )
    .expect("Failed to build probe")
}

#[tokio::test]
async fn test_check_once_reports_reachability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let probe = probe(&server);
    assert!(probe.url().ends_with("/health"));
    assert!(probe.check_once().await);
}

#[tokio::test]
async fn test_check_once_unhealthy_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(!probe(&server).check_once().await);
}

#[tokio::test]
async fn test_spawn_reports_transitions_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cancel = CancellationToken::new();

    let handle = probe(&server).spawn(
        move |online| sink.lock().unwrap().push(online),
        cancel.clone(),
    );

    // Several probe intervals, a single transition
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![true]);
}
