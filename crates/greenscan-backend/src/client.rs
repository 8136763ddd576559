//! HTTP client for the Greenscan API
//!
//! Wraps `reqwest::Client` with base-URL construction, bearer-token
//! authentication and mapping of transport/HTTP failures into the
//! [`RemoteError`] taxonomy.
//!
//! ## Error mapping
//!
//! | Condition                         | RemoteError              |
//! |-----------------------------------|--------------------------|
//! | connect/DNS/body transport error  | `Network`                |
//! | request timeout                   | `Timeout`                |
//! | 429, 503                          | `Overloaded` (Retry-After honored) |
//! | other 5xx                         | `Overloaded`             |
//! | body code `quota_exceeded`, 402   | `QuotaExceeded`          |
//! | 400, 422, unparseable response    | `Validation`             |
//! | anything else non-2xx             | `Api`                    |

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use greenscan_core::config::BackendConfig;
use greenscan_core::domain::queue_entry::AnalysisRequest;
use greenscan_core::domain::{OwnerId, Record, RecordId, RemoteError};
use greenscan_core::ports::{
    AnalysisOutcome, IRemoteBackend, RemoteAnalysis, RemoteCounter, RemoteRecord,
};

// ============================================================================
// Wire payloads
// ============================================================================

/// Error body the API returns on non-2xx responses
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Request body for POST /v1/analyze
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody<'a> {
    owner_id: &'a str,
    source_ref: &'a str,
}

/// Response body for GET /v1/records
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchRecordsResponse {
    records: Vec<RemoteRecord>,
}

/// Request body for POST /v1/usage/{owner}/increment
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IncrementBody {
    amount: u32,
}

/// Serializes a domain record into its wire shape
fn record_to_wire(record: &Record) -> RemoteRecord {
    RemoteRecord {
        id: Some(record.id().to_string()),
        owner_id: Some(record.owner_id().to_string()),
        created_at: Some(record.created_at()),
        ingredients: Some(record.ingredients().to_vec()),
        analysis: Some(RemoteAnalysis {
            verdict: Some(record.analysis().verdict().to_string()),
            confidence: Some(record.analysis().confidence()),
            flagged_ingredients: Some(record.analysis().flagged_ingredients().to_vec()),
            explanation: Some(record.analysis().explanation().to_string()),
        }),
        is_favorite: Some(record.metadata().is_favorite()),
        last_modified: Some(record.last_modified()),
        source_ref: record.metadata().source_ref().map(|s| s.to_string()),
    }
}

// ============================================================================
// HttpBackend
// ============================================================================

/// HTTP implementation of the remote backend port
pub struct HttpBackend {
    /// The underlying HTTP client, configured with explicit timeouts
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Bearer token supplied by the (out-of-scope) auth layer
    auth_token: Option<String>,
}

impl HttpBackend {
    /// Creates a backend client from configuration
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Creates a backend client with a custom base URL (useful for testing)
    pub fn with_base_url(config: &BackendConfig, base_url: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    /// Attaches a bearer token to every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request, mapping transport failures into the taxonomy
    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        self.authorize(builder)
            .send()
            .await
            .map_err(map_transport_error)
    }

    /// Turns a non-success response into the matching RemoteError
    async fn error_for(&self, response: Response) -> RemoteError {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body: ApiErrorBody = response.json().await.unwrap_or_default();
        let message = body.message.unwrap_or_else(|| status.to_string());

        if body.code.as_deref() == Some("quota_exceeded") {
            return RemoteError::QuotaExceeded;
        }

        match status.as_u16() {
            429 | 503 => RemoteError::Overloaded { retry_after },
            500..=599 => RemoteError::Overloaded { retry_after: None },
            402 => RemoteError::QuotaExceeded,
            400 | 422 => RemoteError::Validation(message),
            s => RemoteError::Api { status: s, message },
        }
    }

    /// Deserializes a JSON body, mapping shape mismatches to Validation
    async fn parse<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, RemoteError> {
        let raw = response.text().await.map_err(map_transport_error)?;
        serde_json::from_str(&raw).map_err(|err| {
            warn!(error = %err, "Unparseable response body from backend");
            RemoteError::Validation(format!("unparseable response: {err}"))
        })
    }
}

#[async_trait::async_trait]
impl IRemoteBackend for HttpBackend {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, RemoteError> {
        debug!(owner_id = %request.owner_id, "POST /v1/analyze");
        let response = self
            .send(self.client.post(self.url("/v1/analyze")).json(&AnalyzeBody {
                owner_id: request.owner_id.as_str(),
                source_ref: request.source_ref.as_str(),
            }))
            .await?;

        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        self.parse(response).await
    }

    async fn upsert_record(&self, record: &Record) -> Result<(), RemoteError> {
        debug!(record_id = %record.id(), "PUT /v1/records/{{id}}");
        let url = self.url(&format!("/v1/records/{}", record.id()));
        let response = self
            .send(self.client.put(url).json(&record_to_wire(record)))
            .await?;

        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        Ok(())
    }

    async fn fetch_records(&self, owner_id: &OwnerId) -> Result<Vec<RemoteRecord>, RemoteError> {
        debug!(owner_id = %owner_id, "GET /v1/records");
        let response = self
            .send(
                self.client
                    .get(self.url("/v1/records"))
                    .query(&[("owner", owner_id.as_str())]),
            )
            .await?;

        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        let parsed: FetchRecordsResponse = self.parse(response).await?;
        Ok(parsed.records)
    }

    async fn delete_record(&self, record_id: &RecordId) -> Result<(), RemoteError> {
        debug!(record_id = %record_id, "DELETE /v1/records/{{id}}");
        let url = self.url(&format!("/v1/records/{}", record_id));
        let response = self.send(self.client.delete(url)).await?;

        // Deleting an already-deleted record is a success for our purposes
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(self.error_for(response).await)
    }

    async fn get_counter(&self, owner_id: &OwnerId) -> Result<RemoteCounter, RemoteError> {
        debug!(owner_id = %owner_id, "GET /v1/usage/{{owner}}");
        let url = self.url(&format!("/v1/usage/{}", owner_id));
        let response = self.send(self.client.get(url)).await?;

        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        self.parse(response).await
    }

    async fn increment_counter(
        &self,
        owner_id: &OwnerId,
        amount: u32,
    ) -> Result<RemoteCounter, RemoteError> {
        debug!(owner_id = %owner_id, amount, "POST /v1/usage/{{owner}}/increment");
        let url = self.url(&format!("/v1/usage/{}/increment", owner_id));
        let response = self
            .send(self.client.post(url).json(&IncrementBody { amount }))
            .await?;

        if !response.status().is_success() {
            return Err(self.error_for(response).await);
        }
        self.parse(response).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Maps a reqwest transport failure into the taxonomy
fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(err.to_string())
    }
}

/// Parses a Retry-After header given in whole seconds
///
/// The HTTP-date form is rare from our backend and is ignored; the executor
/// falls back to its own backoff schedule when no hint is available.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_retry_after_missing_or_date() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_record_to_wire_roundtrips_identity() {
        let record = Record::new(
            OwnerId::new("owner-1").unwrap(),
            vec!["water".into()],
            greenscan_core::domain::Analysis::new(
                greenscan_core::domain::Verdict::Vegan,
                0.9,
                vec![],
                "",
            ),
            None,
        );
        let wire = record_to_wire(&record);
        assert_eq!(wire.id.as_deref(), Some(record.id().to_string().as_str()));
        assert_eq!(wire.owner_id.as_deref(), Some("owner-1"));
        assert_eq!(wire.analysis.unwrap().verdict.as_deref(), Some("vegan"));
    }
}
