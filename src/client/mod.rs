//! Call wrapper around every outbound PlayFab request.
//!
//! [`CallWrapper`] is the single choke point: it makes sure a valid entity
//! token exists, runs the remote function under a retry policy, classifies
//! failures into [`ToolError`]s and unwraps the `data` payload.
//!
//! # Example
//!
//! ```rust,no_run
//! use playfab_tools::auth::{EntityTokenSource, TokenCache};
//! use playfab_tools::client::CallWrapper;
//! use playfab_tools::transport::PlatformClient;
//! use playfab_tools::PlayFabConfig;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PlatformClient::new(PlayFabConfig::from_env()?)?;
//! let tokens = Arc::new(TokenCache::new(Arc::new(EntityTokenSource::new(client.clone()))));
//! let calls = CallWrapper::new(tokens);
//!
//! let data: Value = calls
//!     .call_admin(
//!         |credential, request| {
//!             let client = client.clone();
//!             async move { client.post("Server/GetTitleData", Some(&credential), &request).await }
//!         },
//!         json!({ "Keys": ["motd"] }),
//!         "GetTitleData",
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod callback;

pub use callback::{from_callback, Callback};

use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{Credential, TokenCache};
use crate::errors::{RawFailure, ToolError, ToolResult};
use crate::observability::CallTimer;
use crate::resilience::{execute_with_retry, PolicyOverride, RetryPolicy};
use crate::transport::ApiResponse;

/// Request field holding custom tags.
pub const CUSTOM_TAGS_KEY: &str = "CustomTags";

/// Tag added to every tagged request.
pub const MARKER_TAG: &str = "marker";

/// Routes outbound calls through the token cache and the retry engine.
pub struct CallWrapper {
    tokens: Arc<TokenCache>,
    default_policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl CallWrapper {
    /// Creates a wrapper using the standard policy and no attempt timeout.
    pub fn new(tokens: Arc<TokenCache>) -> Self {
        Self {
            tokens,
            default_policy: RetryPolicy::STANDARD,
            attempt_timeout: None,
        }
    }

    /// Bounds the duration of each individual attempt.
    ///
    /// An attempt that runs out of time fails with a timeout error, which
    /// the retry engine treats as transient.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Returns the token cache.
    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Calls `remote` with `request` and returns the unwrapped `data`.
    ///
    /// `overrides` are merged over the standard policy.
    #[instrument(
        skip(self, remote, request, overrides),
        fields(operation = %operation, call_id = %Uuid::new_v4())
    )]
    pub async fn call<Req, T, F, Fut>(
        &self,
        remote: F,
        request: Req,
        operation: &str,
        overrides: Option<PolicyOverride>,
    ) -> ToolResult<T>
    where
        F: Fn(Credential, Req) -> Fut,
        Req: Clone,
        Fut: Future<Output = Result<ApiResponse<T>, RawFailure>>,
    {
        let credential = self.tokens.ensure_valid_credential().await?;
        let policy = match overrides {
            Some(overrides) => self.default_policy.merged(&overrides),
            None => self.default_policy,
        };

        let remote = &remote;
        let request = &request;
        let credential = &credential;
        let mut attempt: u32 = 0;

        execute_with_retry(&policy, move || {
            attempt += 1;
            let pending = remote(credential.clone(), request.clone());
            self.run_attempt(pending, operation, attempt)
        })
        .await
    }

    /// Player-facing call under the strict policy.
    pub async fn call_player<Req, T, F, Fut>(
        &self,
        remote: F,
        request: Req,
        operation: &str,
    ) -> ToolResult<T>
    where
        F: Fn(Credential, Req) -> Fut,
        Req: Clone,
        Fut: Future<Output = Result<ApiResponse<T>, RawFailure>>,
    {
        self.call(remote, request, operation, Some(RetryPolicy::STRICT.into()))
            .await
    }

    /// Admin call under the standard policy.
    pub async fn call_admin<Req, T, F, Fut>(
        &self,
        remote: F,
        request: Req,
        operation: &str,
    ) -> ToolResult<T>
    where
        F: Fn(Credential, Req) -> Fut,
        Req: Clone,
        Fut: Future<Output = Result<ApiResponse<T>, RawFailure>>,
    {
        self.call(remote, request, operation, Some(RetryPolicy::STANDARD.into()))
            .await
    }

    /// Batch call under the bulk policy.
    pub async fn call_bulk<Req, T, F, Fut>(
        &self,
        remote: F,
        request: Req,
        operation: &str,
    ) -> ToolResult<T>
    where
        F: Fn(Credential, Req) -> Fut,
        Req: Clone,
        Fut: Future<Output = Result<ApiResponse<T>, RawFailure>>,
    {
        self.call(remote, request, operation, Some(RetryPolicy::BULK.into()))
            .await
    }

    async fn run_attempt<T, Fut>(&self, pending: Fut, operation: &str, attempt: u32) -> ToolResult<T>
    where
        Fut: Future<Output = Result<ApiResponse<T>, RawFailure>>,
    {
        let timer = CallTimer::start(operation);

        let outcome = match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let err = ToolError::generic(format!(
                        "Request timeout: {} did not respond within {}ms",
                        operation,
                        limit.as_millis()
                    ));
                    timer.failure(attempt, &err);
                    return Err(err);
                }
            },
            None => pending.await,
        };

        let result = match outcome {
            Ok(ApiResponse { data: Some(data), .. }) => Ok(data),
            Ok(_) => Err(ToolError::generic(format!("No data returned from {}", operation))),
            Err(failure) => Err(ToolError::from_raw(failure, operation)),
        };

        match &result {
            Ok(_) => timer.success(attempt),
            Err(err) => timer.failure(attempt, err),
        }

        result
    }
}

impl std::fmt::Debug for CallWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallWrapper")
            .field("default_policy", &self.default_policy)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

/// Adds the marker tag to a request's `CustomTags`.
///
/// Tags supplied by the caller win over the marker.
pub fn add_custom_tags(mut request: Value) -> Value {
    if let Value::Object(fields) = &mut request {
        let tags = fields
            .entry(CUSTOM_TAGS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));

        if tags.is_null() {
            *tags = Value::Object(Map::new());
        }

        if let Value::Object(tags) = tags {
            tags.entry(MARKER_TAG)
                .or_insert_with(|| Value::String("true".to_string()));
        }
    }
    request
}
