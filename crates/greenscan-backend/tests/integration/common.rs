//! Shared test helpers for backend API integration tests
//!
//! Each helper returns an `HttpBackend` pointed at a wiremock server; tests
//! mount whatever endpoints they need on top.

use wiremock::MockServer;

use greenscan_backend::HttpBackend;
use greenscan_core::config::BackendConfig;
use greenscan_core::domain::queue_entry::AnalysisRequest;
use greenscan_core::domain::{OwnerId, SourceRef};

/// Starts a mock server and a backend client pointed at it
pub async fn setup_backend() -> (MockServer, HttpBackend) {
    let server = MockServer::start().await;
    let config = BackendConfig {
        base_url: server.uri(),
        timeout_secs: 5,
    };
    let backend = HttpBackend::with_base_url(&config, server.uri())
        .expect("failed to build backend client")
        .with_auth_token("test-token");
    (server, backend)
}

pub fn owner() -> OwnerId {
    OwnerId::new("owner-1").unwrap()
}

pub fn analysis_request() -> AnalysisRequest {
    AnalysisRequest {
        owner_id: owner(),
        source_ref: SourceRef::new("file:///scans/42.jpg").unwrap(),
    }
}
