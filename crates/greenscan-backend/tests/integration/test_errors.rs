//! Integration tests for the error-taxonomy mapping

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use greenscan_core::domain::RemoteError;
use greenscan_core::ports::IRemoteBackend;

use crate::common;

#[tokio::test]
async fn test_429_maps_to_overloaded_with_retry_after() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("GET"))
        .and(path("/v1/usage/owner-1"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let err = backend.get_counter(&common::owner()).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Overloaded {
            retry_after: Some(Duration::from_secs(30))
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_500_maps_to_overloaded() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("GET"))
        .and(path("/v1/usage/owner-1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = backend.get_counter(&common::owner()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Overloaded { retry_after: None }));
}

#[tokio::test]
async fn test_quota_code_maps_to_quota_exceeded_regardless_of_status() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("POST"))
        .and(path("/v1/usage/owner-1/increment"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "code": "quota_exceeded",
            "message": "Monthly quota spent"
        })))
        .mount(&server)
        .await;

    let err = backend
        .increment_counter(&common::owner(), 1)
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::QuotaExceeded);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_402_maps_to_quota_exceeded() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(402))
        .mount(&server)
        .await;

    let err = backend
        .analyze(&common::analysis_request())
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::QuotaExceeded);
}

#[tokio::test]
async fn test_400_maps_to_validation() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": "bad_image",
            "message": "Image is unreadable"
        })))
        .mount(&server)
        .await;

    let err = backend
        .analyze(&common::analysis_request())
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::Validation("Image is unreadable".into()));
}

#[tokio::test]
async fn test_404_maps_to_api_error() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("GET"))
        .and(path("/v1/usage/owner-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = backend.get_counter(&common::owner()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Api { status: 404, .. }));
}

#[tokio::test]
async fn test_connection_refused_maps_to_network() {
    let (server, backend) = common::setup_backend().await;
    // Shut the server down so the next call cannot connect
    drop(server);

    let err = backend.get_counter(&common::owner()).await.unwrap_err();
    assert!(matches!(
        err,
        RemoteError::Network(_) | RemoteError::Timeout
    ));
    assert!(err.is_retryable());
}
