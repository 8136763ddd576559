//! Integration tests for the usage counter endpoints

use wiremock::matchers::{body_json_string, method, path};
use wiremock::{Mock, ResponseTemplate};

use greenscan_core::ports::IRemoteBackend;

use crate::common;

#[tokio::test]
async fn test_get_counter() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("GET"))
        .and(path("/v1/usage/owner-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "used": 12,
            "limit": 30,
            "periodStart": "2026-08-01T00:00:00Z",
            "periodEnd": "2026-08-31T00:00:00Z",
            "isPremium": false
        })))
        .mount(&server)
        .await;

    let counter = backend.get_counter(&common::owner()).await.unwrap();
    assert_eq!(counter.used, 12);
    assert_eq!(counter.limit, 30);
    assert!(counter.period_start.is_some());
    assert_eq!(counter.is_premium, Some(false));
}

#[tokio::test]
async fn test_increment_counter_returns_authoritative_value() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("POST"))
        .and(path("/v1/usage/owner-1/increment"))
        .and(body_json_string(r#"{"amount":1}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "used": 13,
            "limit": 30
        })))
        .expect(1)
        .mount(&server)
        .await;

    let counter = backend.increment_counter(&common::owner(), 1).await.unwrap();
    assert_eq!(counter.used, 13);
    // Optional period fields may be absent
    assert!(counter.period_end.is_none());
}
