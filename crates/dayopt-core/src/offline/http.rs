//! HTTP client for the managed reconciliation API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::endpoint::{EndpointError, ReconciliationEndpoint, SyncRequest, SyncResult};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const APPLY_PATH: &str = "/v1/sync/apply";

/// Posts each mutation as JSON to `{base}/v1/sync/apply`.
///
/// 2xx and 409 bodies decode as [`SyncResult`]; 5xx and 429 are transient,
/// other 4xx are rejections.
#[derive(Clone)]
pub struct HttpReconciliationEndpoint {
    endpoint: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpReconciliationEndpoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpReconciliationEndpoint")
            .field("endpoint", &self.endpoint)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpReconciliationEndpoint {
    pub fn new(base_url: impl Into<String>) -> Result<Self, EndpointError> {
        let endpoint = format!("{}{APPLY_PATH}", normalize_base_url(base_url.into())?);
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| EndpointError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            endpoint,
            access_token: None,
            client,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = normalize_text_option(Some(token.into()));
        self
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReconciliationEndpoint for HttpReconciliationEndpoint {
    async fn apply(&self, request: SyncRequest) -> Result<SyncResult, EndpointError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                EndpointError::Timeout
            } else {
                EndpointError::Network(error.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| EndpointError::Network(error.to_string()))?;
        decode_response(status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn decode_response(status: StatusCode, body: &str) -> Result<SyncResult, EndpointError> {
    if status.is_success() || status == StatusCode::CONFLICT {
        return serde_json::from_str(body).map_err(|error| {
            EndpointError::InvalidResponse(format!("{error}: {}", compact_text(body)))
        });
    }

    let message = parse_api_error(body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(EndpointError::Server {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(EndpointError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }
    compact_text(body)
}

fn normalize_base_url(raw: String) -> Result<String, EndpointError> {
    let base = normalize_text_option(Some(raw)).ok_or_else(|| {
        EndpointError::InvalidConfiguration("endpoint must not be empty".to_string())
    })?;
    if is_http_url(&base) {
        Ok(base.trim_end_matches('/').to_string())
    } else {
        Err(EndpointError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}
