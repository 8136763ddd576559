//! Integration tests for the analyze endpoint

use wiremock::matchers::{body_json_string, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use greenscan_core::domain::{RemoteError, Verdict};
use greenscan_core::ports::IRemoteBackend;

use crate::common;

#[tokio::test]
async fn test_analyze_parses_outcome() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ingredients": ["water", "sugar", "gelatin"],
            "verdict": "non_vegan",
            "confidence": 0.93,
            "flaggedIngredients": ["gelatin"],
            "explanation": "Gelatin is animal-derived."
        })))
        .mount(&server)
        .await;

    let outcome = backend
        .analyze(&common::analysis_request())
        .await
        .expect("analyze failed");

    assert_eq!(outcome.verdict, Verdict::NonVegan);
    assert_eq!(outcome.confidence, 0.93);
    assert_eq!(outcome.flagged_ingredients, vec!["gelatin"]);
    assert_eq!(outcome.ingredients.len(), 3);
}

#[tokio::test]
async fn test_analyze_sends_camel_case_body() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .and(body_json_string(
            r#"{"ownerId":"owner-1","sourceRef":"file:///scans/42.jpg"}"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ingredients": [],
            "verdict": "uncertain",
            "confidence": 0.0,
            "flaggedIngredients": [],
            "explanation": ""
        })))
        .mount(&server)
        .await;

    let outcome = backend.analyze(&common::analysis_request()).await.unwrap();
    assert_eq!(outcome.verdict, Verdict::Uncertain);
}

#[tokio::test]
async fn test_analyze_malformed_response_is_validation_error() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("POST"))
        .and(path("/v1/analyze"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("{\"unexpected\": \"shape\"}"),
        )
        .mount(&server)
        .await;

    let err = backend
        .analyze(&common::analysis_request())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Validation(_)));
    assert!(!err.is_retryable());
}
