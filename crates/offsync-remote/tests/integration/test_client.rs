//! Integration tests for the HTTP mapping of RemoteClient
//!
//! Verifies verbs, bodies, authentication and the classification of
//! non-success responses into RemoteError variants.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use offsync_core::ports::{RemoteClient, RemoteError};

use crate::common;

#[tokio::test]
async fn test_create_posts_payload_and_lifts_metadata() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("POST"))
        .and(path("/goals/1/steps"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_json(json!({"title": "Run 5k"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "title": "Run 5k",
            "version": 1,
            "updatedAt": 1_700_000_000_000_i64
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = client
        .create("/goals/1/steps", &json!({"title": "Run 5k"}))
        .await
        .expect("create failed");

    assert_eq!(record.data["title"], "Run 5k");
    assert_eq!(record.version, Some(1));
    assert_eq!(record.last_modified, Some(1_700_000_000_000));
}

#[tokio::test]
async fn test_read_returns_body() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("GET"))
        .and(path("/goal_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"title": "Run 10k"})))
        .mount(&server)
        .await;

    let record = client.read("/goal_1").await.expect("read failed");
    assert_eq!(record.data, json!({"title": "Run 10k"}));
    assert!(record.version.is_none());
}

#[tokio::test]
async fn test_update_without_body_echoes_payload() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("PUT"))
        .and(path("/goal_1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let record = client
        .update("/goal_1", &json!({"title": "Run 5k"}))
        .await
        .expect("update failed");
    assert_eq!(record.data, json!({"title": "Run 5k"}));
}

#[tokio::test]
async fn test_delete_success_and_not_found() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/goal_1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/goal_2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client.delete("/goal_1").await.expect("delete failed");
    assert_eq!(
        client.delete("/goal_2").await,
        Err(RemoteError::NotFound("/goal_2".to_string()))
    );
}

#[tokio::test]
async fn test_conflict_carries_current_record() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("PUT"))
        .and(path("/goal_1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "title": "Run 10k",
            "version": 4
        })))
        .mount(&server)
        .await;

    let err = client
        .update("/goal_1", &json!({"title": "Run 5k"}))
        .await
        .unwrap_err();

    let RemoteError::Conflict { current: Some(current) } = err else {
        panic!("expected conflict with body, got {err:?}");
    };
    assert_eq!(current.data["title"], "Run 10k");
    assert_eq!(current.version, Some(4));
}

#[tokio::test]
async fn test_conflict_without_body() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("POST"))
        .and(path("/goal_1"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let err = client.create("/goal_1", &json!({})).await.unwrap_err();
    assert_eq!(err, RemoteError::Conflict { current: None });
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("GET"))
        .and(path("/goal_1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.read("/goal_1").await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Status {
            status: 503,
            message: "maintenance".to_string()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_invalid_json_maps_to_decode() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("GET"))
        .and(path("/goal_1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        client.read("/goal_1").await,
        Err(RemoteError::Decode(_))
    ));
}

#[tokio::test]
async fn test_slow_response_maps_to_timeout() {
    let (server, client) = common::setup_backend_mock().await;

    Mock::given(method("GET"))
        .and(path("/goal_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(common::TEST_TIMEOUT + Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    assert_eq!(client.read("/goal_1").await, Err(RemoteError::Timeout));
}
