//! HTTP transport implementation.
//!
//! Posts the sync request as JSON to `{api_url}/sync` with the caller id as
//! a bearer token. Failure bodies from the server share the response shape,
//! so they are decoded before the status code is considered.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use tally_engine::{Identity, SyncRequest, SyncResponse};

/// Header carrying the caller role.
pub const ROLE_HEADER: &str = "x-user-role";

/// HTTP-based sync transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Base URL of the sync server (e.g., "https://pos.example.com").
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with default client settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Creates a transport honoring the configured request timeout.
    pub fn from_config(config: &ClientConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self::with_client(config.api_url.clone(), client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sync_url(&self) -> String {
        format!("{}/sync", self.base_url)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn send(&self, request: &SyncRequest, identity: &Identity) -> SyncResult<SyncResponse> {
        let response = self
            .client
            .post(self.sync_url())
            .bearer_auth(&identity.id)
            .header(ROLE_HEADER, &identity.role)
            .json(request)
            .send()
            .await
            .map_err(|e| SyncError::transport_retryable(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport_retryable(e.to_string()))?;

        match serde_json::from_slice::<SyncResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) if status.is_success() => {
                Err(SyncError::Protocol(format!("invalid response body: {e}")))
            }
            Err(_) => Err(SyncError::transport_retryable(format!(
                "server returned {status}"
            ))),
        }
    }
}
