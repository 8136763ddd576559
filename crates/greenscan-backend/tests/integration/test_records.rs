//! Integration tests for record upsert/fetch/delete

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use greenscan_core::domain::{Analysis, OwnerId, Record, RecordId, Verdict};
use greenscan_core::ports::IRemoteBackend;

use crate::common;

fn record() -> Record {
    let mut record = Record::new(
        common::owner(),
        vec!["water".into(), "hops".into()],
        Analysis::new(Verdict::Vegan, 0.95, vec![], "Plant-based."),
        None,
    );
    record.mark_persisted();
    record
}

#[tokio::test]
async fn test_upsert_record_puts_by_id() {
    let (server, backend) = common::setup_backend().await;
    let record = record();

    Mock::given(method("PUT"))
        .and(path(format!("/v1/records/{}", record.id())))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    backend.upsert_record(&record).await.expect("upsert failed");
}

#[tokio::test]
async fn test_fetch_records_scopes_by_owner() {
    let (server, backend) = common::setup_backend().await;
    let id = RecordId::new();

    Mock::given(method("GET"))
        .and(path("/v1/records"))
        .and(query_param("owner", "owner-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{
                "id": id.to_string(),
                "ownerId": "owner-1",
                "createdAt": "2026-07-01T10:00:00Z",
                "ingredients": ["water"],
                "analysis": {
                    "verdict": "vegan",
                    "confidence": 0.9,
                    "flaggedIngredients": [],
                    "explanation": "ok"
                },
                "isFavorite": false,
                "lastModified": "2026-07-02T10:00:00Z"
            }]
        })))
        .mount(&server)
        .await;

    let records = backend.fetch_records(&common::owner()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id.as_deref(), Some(id.to_string().as_str()));
    assert_eq!(
        records[0].analysis.as_ref().unwrap().verdict.as_deref(),
        Some("vegan")
    );
}

#[tokio::test]
async fn test_fetch_records_tolerates_partial_payloads() {
    let (server, backend) = common::setup_backend().await;

    // A barely shaped record must still deserialize; normalization happens
    // in the synchronizer, not here
    Mock::given(method("GET"))
        .and(path("/v1/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{ "id": RecordId::new().to_string() }]
        })))
        .mount(&server)
        .await;

    let records = backend.fetch_records(&common::owner()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].analysis.is_none());
    assert!(records[0].last_modified.is_none());
}

#[tokio::test]
async fn test_delete_record() {
    let (server, backend) = common::setup_backend().await;
    let id = RecordId::new();

    Mock::given(method("DELETE"))
        .and(path(format!("/v1/records/{}", id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend.delete_record(&id).await.expect("delete failed");
}

#[tokio::test]
async fn test_delete_unknown_record_is_not_an_error() {
    let (server, backend) = common::setup_backend().await;
    let id = RecordId::new();

    Mock::given(method("DELETE"))
        .and(path(format!("/v1/records/{}", id)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    backend.delete_record(&id).await.expect("404 should be ok");
}

#[tokio::test]
async fn test_fetch_records_for_other_owner() {
    let (server, backend) = common::setup_backend().await;

    Mock::given(method("GET"))
        .and(path("/v1/records"))
        .and(query_param("owner", "owner-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "records": [] })),
        )
        .mount(&server)
        .await;

    let records = backend
        .fetch_records(&OwnerId::new("owner-2").unwrap())
        .await
        .unwrap();
    assert!(records.is_empty());
}
