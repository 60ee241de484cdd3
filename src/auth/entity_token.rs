//! Entity token acquisition over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{Credential, TokenSource};
use crate::errors::RawFailure;
use crate::transport::PlatformClient;

/// API method name of the token endpoint.
pub const GET_ENTITY_TOKEN: &str = "GetEntityToken";

const GET_ENTITY_TOKEN_PATH: &str = "Authentication/GetEntityToken";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntityTokenData {
    entity_token: String,
    token_expiration: DateTime<Utc>,
}

/// Obtains title entity tokens with the developer secret key.
#[derive(Debug, Clone)]
pub struct EntityTokenSource {
    client: PlatformClient,
}

impl EntityTokenSource {
    /// Creates a token source using `client`.
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenSource for EntityTokenSource {
    async fn fetch_credential(&self) -> Result<Credential, RawFailure> {
        let response = self
            .client
            .post(GET_ENTITY_TOKEN_PATH, None, &json!({}))
            .await?;

        let data = response.data.ok_or_else(|| {
            RawFailure::transport(format!("No data returned from {}", GET_ENTITY_TOKEN), None)
        })?;

        let data: EntityTokenData = serde_json::from_value(data).map_err(|e| {
            RawFailure::transport(format!("Malformed entity token response: {}", e), None)
        })?;

        Ok(Credential::new(data.entity_token, data.token_expiration))
    }
}
