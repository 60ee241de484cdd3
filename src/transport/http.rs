//! HTTP transport implementation.

use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::ApiResponse;
use crate::auth::Credential;
use crate::config::PlayFabConfig;
use crate::errors::{RawFailure, ToolError, ToolResult, UpstreamError};

/// SDK identification header value.
pub const SDK_HEADER: &str = concat!("PlayFabToolsRust-", env!("CARGO_PKG_VERSION"));

/// Posts JSON requests to the PlayFab API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    config: Arc<PlayFabConfig>,
}

impl PlatformClient {
    /// Creates a new client.
    pub fn new(config: PlayFabConfig) -> ToolResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ToolError::generic(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PlayFabConfig {
        &self.config
    }

    /// Posts `body` to `path` and decodes the envelope.
    ///
    /// Platform error bodies are decoded into [`RawFailure::Platform`];
    /// everything that did not produce one becomes [`RawFailure::Transport`].
    #[instrument(skip(self, credential, body), fields(path = %path))]
    pub async fn post(
        &self,
        path: &str,
        credential: Option<&Credential>,
        body: &Value,
    ) -> Result<ApiResponse<Value>, RawFailure> {
        let mut request = self
            .client
            .post(self.config.endpoint_url(path))
            .header("X-SecretKey", self.config.secret_key())
            .header("X-PlayFabSDK", SDK_HEADER)
            .json(body);

        if let Some(credential) = credential {
            request = request.header("X-EntityToken", credential.token());
        }

        let response = request.send().await.map_err(network_failure)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(network_failure)?;

        let Ok(body) = serde_json::from_str::<Value>(&text) else {
            return Err(RawFailure::transport(
                format!("Malformed response from {} (HTTP {})", path, status),
                Some(status),
            ));
        };

        if (200..300).contains(&status) {
            return serde_json::from_value(body).map_err(|e| {
                RawFailure::transport(
                    format!("Malformed envelope from {}: {}", path, e),
                    Some(status),
                )
            });
        }

        match UpstreamError::recognize(&body) {
            Some(upstream) => Err(RawFailure::Platform(upstream)),
            None => Err(RawFailure::transport(
                format!("HTTP {} from {}", status, path),
                Some(status),
            )),
        }
    }
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("config", &self.config)
            .finish()
    }
}

fn network_failure(err: reqwest::Error) -> RawFailure {
    let message = if err.is_timeout() {
        format!("Network error: request timeout: {}", err)
    } else {
        format!("Network error: {}", err)
    };
    RawFailure::transport(message, err.status().map(|s| s.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_header_has_version() {
        assert!(SDK_HEADER.starts_with("PlayFabToolsRust-"));
        assert!(SDK_HEADER.len() > "PlayFabToolsRust-".len());
    }

    #[test]
    fn test_network_failure_wording_is_retryable() {
        let failure = RawFailure::transport("Network error: connection refused", None);
        let error = ToolError::from_raw(failure, "GetTitleData");
        assert!(crate::resilience::is_retryable(
            &error,
            &crate::resilience::RetryPolicy::STANDARD
        ));
    }
}
