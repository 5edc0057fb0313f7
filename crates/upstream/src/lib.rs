//! HTTP infrastructure adapter for the remote API.
//!
//! Implements the [`admission::UpstreamClient`] trait over `reqwest`. All
//! transport detail lives here: URL construction, bearer authentication,
//! and the mapping from HTTP status codes onto the normalised
//! [`UpstreamFailure`] model. The `admission` crate sees only the trait.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain admission rules. Retry
//! policy in particular belongs to `admission`'s invoker; one `call` here is
//! always exactly one HTTP request.
//!
//! ## Failure normalisation
//!
//! | Upstream condition | `UpstreamFailureKind` |
//! |--------------------|-----------------------|
//! | HTTP 429 | `Overloaded` (the retry-eligible condition) |
//! | HTTP 404 | `NotFound` |
//! | HTTP 400, 422 | `Validation` |
//! | HTTP 5xx | `Server` |
//! | any other non-2xx | `Other` |
//! | no response (connect/timeout) | `Transport` |
//!
//! The upstream's error body is carried in `detail` unmodified.

use async_trait::async_trait;
use serde_json::Value;

use admission::{Credential, OperationName, UpstreamClient, UpstreamFailure, UpstreamFailureKind};

/// Remote API client over HTTP.
///
/// Operations map to `POST {base_url}/{operation}` with the payload as the
/// JSON body and the credential as a bearer token.
pub struct HttpUpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUpstreamClient {
    /// Creates a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Creates a client with a custom `reqwest` client (e.g. with timeouts
    /// or proxy settings configured by the composition root).
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn call(
        &self,
        operation: &OperationName,
        payload: &Value,
        credential: &Credential,
    ) -> Result<Value, UpstreamFailure> {
        let url = format!("{}/{}", self.base_url, operation.as_str());

        let response = self
            .http
            .post(&url)
            .bearer_auth(credential.expose())
            .json(payload)
            .send()
            .await
            .map_err(|e| UpstreamFailure::transport(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return response.json::<Value>().await.map_err(|e| {
                UpstreamFailure::new(
                    UpstreamFailureKind::Other,
                    Some(status),
                    Value::String(format!("upstream returned invalid JSON: {}", e.without_url())),
                )
            });
        }

        // The error body travels through unmodified; absent or non-JSON
        // bodies become null.
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        tracing::debug!(operation = %operation, status, "upstream returned an error status");
        Err(normalise_failure(status, body))
    }
}

/// Maps a non-success HTTP status onto the upstream failure model.
fn normalise_failure(status: u16, body: Value) -> UpstreamFailure {
    UpstreamFailure::new(classify_status(status), Some(status), body)
}

/// Classifies a non-success HTTP status code.
fn classify_status(status: u16) -> UpstreamFailureKind {
    match status {
        429 => UpstreamFailureKind::Overloaded,
        404 => UpstreamFailureKind::NotFound,
        400 | 422 => UpstreamFailureKind::Validation,
        500..=599 => UpstreamFailureKind::Server,
        _ => UpstreamFailureKind::Other,
    }
}
