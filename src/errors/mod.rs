//! Error types for the PlayFab tools.
//!
//! Every failure that leaves the call-reliability core is a [`ToolError`].
//! The variant decides whether the failure is retried and how it is shown
//! to the caller.

mod upstream;

pub use upstream::{RawFailure, UpstreamError, RATE_LIMIT_ERROR_CODES, RATE_LIMIT_ERROR_NAMES};

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Machine code for malformed caller input.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// Machine code for credential failures.
pub const AUTHENTICATION_ERROR: &str = "AUTHENTICATION_ERROR";
/// Machine code for upstream throttling.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
/// Machine code for wrapped upstream failures.
pub const PLAYFAB_API_ERROR: &str = "PLAYFAB_API_ERROR";
/// Machine code for everything else.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Machine code for dispatch of an unregistered tool.
pub const UNKNOWN_TOOL: &str = "UNKNOWN_TOOL";

/// Typed error carried through the router, call wrapper and retry engine.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Caller input is malformed. Never retried.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message.
        message: String,
        /// Machine-readable code.
        code: String,
        /// Structured detail payload.
        details: Option<Value>,
    },

    /// Credential refresh failed. Never retried.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message.
        message: String,
        /// Machine-readable code.
        code: String,
        /// Structured detail payload.
        details: Option<Value>,
    },

    /// Upstream throttling. Always retried.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Error message.
        message: String,
        /// Machine-readable code.
        code: String,
        /// Server supplied backoff hint in seconds.
        retry_after: Option<u64>,
        /// Structured detail payload.
        details: Option<Value>,
    },

    /// A failure reported by the PlayFab API.
    #[error("PlayFab API error in {api_method}: {message}")]
    UpstreamApi {
        /// Error message.
        message: String,
        /// Machine-readable code.
        code: String,
        /// HTTP status reported upstream.
        status_code: Option<u16>,
        /// The API method that failed.
        api_method: String,
        /// Decoded upstream error, if it was recognizable.
        upstream: Option<UpstreamError>,
        /// Structured detail payload.
        details: Option<Value>,
    },

    /// Anything not covered above.
    #[error("{message}")]
    Generic {
        /// Error message.
        message: String,
        /// Machine-readable code.
        code: String,
        /// HTTP-style status, when known.
        status_code: Option<u16>,
        /// Structured detail payload.
        details: Option<Value>,
    },
}

/// Variant tag of a [`ToolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`ToolError::Validation`].
    Validation,
    /// See [`ToolError::Authentication`].
    Authentication,
    /// See [`ToolError::RateLimit`].
    RateLimit,
    /// See [`ToolError::UpstreamApi`].
    UpstreamApi,
    /// See [`ToolError::Generic`].
    Generic,
}

impl ToolError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ToolError::Validation {
            message: message.into(),
            code: VALIDATION_ERROR.to_string(),
            details: None,
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        ToolError::Authentication {
            message: message.into(),
            code: AUTHENTICATION_ERROR.to_string(),
            details: None,
        }
    }

    /// Creates a rate limit error with an optional backoff hint in seconds.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        ToolError::RateLimit {
            message: message.into(),
            code: RATE_LIMIT_EXCEEDED.to_string(),
            retry_after,
            details: None,
        }
    }

    /// Creates a generic error.
    pub fn generic(message: impl Into<String>) -> Self {
        ToolError::Generic {
            message: message.into(),
            code: INTERNAL_ERROR.to_string(),
            status_code: None,
            details: None,
        }
    }

    /// Creates a generic error carrying an HTTP-style status.
    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        ToolError::Generic {
            message: message.into(),
            code: INTERNAL_ERROR.to_string(),
            status_code: Some(status_code),
            details: None,
        }
    }

    /// Creates the error returned when dispatching an unregistered tool.
    pub fn unknown_tool(name: &str) -> Self {
        ToolError::Generic {
            message: format!("Unknown tool: {}", name),
            code: UNKNOWN_TOOL.to_string(),
            status_code: Some(404),
            details: None,
        }
    }

    /// Wraps a decoded upstream error raised by `api_method`.
    pub fn upstream(upstream: UpstreamError, api_method: impl Into<String>) -> Self {
        let api_method = api_method.into();
        let message = upstream
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} failed", api_method));
        let details = json!({
            "apiMethod": api_method,
            "upstream": upstream,
        });

        ToolError::UpstreamApi {
            message,
            code: PLAYFAB_API_ERROR.to_string(),
            status_code: upstream.code,
            api_method,
            upstream: Some(upstream),
            details: Some(details),
        }
    }

    /// Wraps any caught value raised by `api_method`.
    ///
    /// Values that do not look like a platform error still become an
    /// upstream error, with a generic message.
    pub fn from_upstream(value: &Value, api_method: impl Into<String>) -> Self {
        let api_method = api_method.into();
        match UpstreamError::recognize(value) {
            Some(upstream) => ToolError::upstream(upstream, api_method),
            None => ToolError::UpstreamApi {
                message: format!("An unexpected error occurred while calling {}", api_method),
                code: PLAYFAB_API_ERROR.to_string(),
                status_code: None,
                details: Some(json!({ "apiMethod": api_method, "raw": value })),
                api_method,
                upstream: None,
            },
        }
    }

    /// Classifies a decoded remote failure of `api_method`.
    ///
    /// Throttling signatures become [`ToolError::RateLimit`] carrying the
    /// server hint; other platform errors are wrapped as upstream errors.
    pub fn from_raw(failure: RawFailure, api_method: &str) -> Self {
        match failure {
            RawFailure::Platform(upstream) if upstream.is_rate_limited() => {
                let message = upstream
                    .message()
                    .unwrap_or("Too many requests")
                    .to_string();
                let retry_after = upstream.retry_after_seconds;
                ToolError::rate_limit(message, retry_after).with_details(json!({
                    "apiMethod": api_method,
                    "upstream": upstream,
                }))
            }
            RawFailure::Platform(upstream) => ToolError::upstream(upstream, api_method),
            RawFailure::Transport { message, status } => ToolError::Generic {
                message,
                code: INTERNAL_ERROR.to_string(),
                status_code: status,
                details: Some(json!({ "apiMethod": api_method })),
            },
            RawFailure::Unknown(value) => ToolError::from_upstream(&value, api_method),
        }
    }

    /// Attaches a structured detail payload.
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            ToolError::Validation { details, .. }
            | ToolError::Authentication { details, .. }
            | ToolError::RateLimit { details, .. }
            | ToolError::UpstreamApi { details, .. }
            | ToolError::Generic { details, .. } => *details = Some(value),
        }
        self
    }

    /// Returns the variant tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Validation { .. } => ErrorKind::Validation,
            ToolError::Authentication { .. } => ErrorKind::Authentication,
            ToolError::RateLimit { .. } => ErrorKind::RateLimit,
            ToolError::UpstreamApi { .. } => ErrorKind::UpstreamApi,
            ToolError::Generic { .. } => ErrorKind::Generic,
        }
    }

    /// Returns the human message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            ToolError::Validation { message, .. }
            | ToolError::Authentication { message, .. }
            | ToolError::RateLimit { message, .. }
            | ToolError::UpstreamApi { message, .. }
            | ToolError::Generic { message, .. } => message,
        }
    }

    /// Returns the machine-readable code.
    pub fn code(&self) -> &str {
        match self {
            ToolError::Validation { code, .. }
            | ToolError::Authentication { code, .. }
            | ToolError::RateLimit { code, .. }
            | ToolError::UpstreamApi { code, .. }
            | ToolError::Generic { code, .. } => code,
        }
    }

    /// Returns the HTTP-style status code, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ToolError::Validation { .. } => Some(400),
            ToolError::Authentication { .. } => Some(401),
            ToolError::RateLimit { .. } => Some(429),
            ToolError::UpstreamApi { status_code, .. } => status_code.or(Some(500)),
            ToolError::Generic { status_code, .. } => *status_code,
        }
    }

    /// Returns the structured detail payload, if any.
    pub fn details(&self) -> Option<&Value> {
        match self {
            ToolError::Validation { details, .. }
            | ToolError::Authentication { details, .. }
            | ToolError::RateLimit { details, .. }
            | ToolError::UpstreamApi { details, .. }
            | ToolError::Generic { details, .. } => details.as_ref(),
        }
    }

    /// Returns the retry-after hint if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ToolError::RateLimit { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }

    /// Builds the externally visible error shape.
    ///
    /// Details are stripped in production mode.
    pub fn to_response(&self, production: bool) -> ErrorResponse {
        ErrorResponse {
            message: self.message().to_string(),
            code: self.code().to_string(),
            status_code: self.status_code(),
            details: if production {
                None
            } else {
                self.details().cloned()
            },
        }
    }
}

/// Returns true if `value` structurally resembles a PlayFab error body.
pub fn is_upstream_error(value: &Value) -> bool {
    UpstreamError::recognize(value).is_some()
}

/// Error shape handed to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Human message.
    pub message: String,
    /// Machine-readable code.
    pub code: String,
    /// HTTP-style status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Detail payload, only present outside production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::Validation {
            message: err.to_string(),
            code: "INVALID_JSON".to_string(),
            details: None,
        }
    }
}

impl From<url::ParseError> for ToolError {
    fn from(err: url::ParseError) -> Self {
        ToolError::Generic {
            message: format!("Invalid URL: {}", err),
            code: "CONFIGURATION_ERROR".to_string(),
            status_code: None,
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_per_kind() {
        assert_eq!(ToolError::validation("bad").status_code(), Some(400));
        assert_eq!(ToolError::authentication("bad").status_code(), Some(401));
        assert_eq!(ToolError::rate_limit("slow", None).status_code(), Some(429));
        assert_eq!(ToolError::generic("bad").status_code(), None);
        assert_eq!(ToolError::with_status("bad", 503).status_code(), Some(503));
    }

    #[test]
    fn test_retry_after() {
        let error = ToolError::rate_limit("slow down", Some(30));
        assert_eq!(error.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(ToolError::generic("x").retry_after(), None);
    }

    #[test]
    fn test_from_upstream_recognized() {
        let value = json!({
            "code": 400,
            "error": "InvalidParams",
            "errorCode": 1000,
            "errorMessage": "Invalid input parameters"
        });

        let error = ToolError::from_upstream(&value, "GetPlayerProfile");
        match &error {
            ToolError::UpstreamApi {
                message,
                api_method,
                upstream,
                status_code,
                ..
            } => {
                assert_eq!(message, "Invalid input parameters");
                assert_eq!(api_method, "GetPlayerProfile");
                assert_eq!(*status_code, Some(400));
                assert!(upstream.is_some());
            }
            other => panic!("Expected UpstreamApi error, got {:?}", other),
        }
        assert_eq!(error.code(), PLAYFAB_API_ERROR);
    }

    #[test]
    fn test_from_upstream_fallback() {
        let error = ToolError::from_upstream(&json!("socket closed"), "BanUsers");

        assert_eq!(error.kind(), ErrorKind::UpstreamApi);
        assert!(error.message().contains("unexpected error"));
        assert!(error.message().contains("BanUsers"));
        assert_eq!(error.status_code(), Some(500));
    }

    #[test]
    fn test_from_raw_rate_limit_carries_hint() {
        let failure = RawFailure::decode(json!({
            "code": 429,
            "status": "TooManyRequests",
            "error": "APIClientRequestRateLimitExceeded",
            "errorCode": 1199,
            "errorMessage": "The client has exceeded the maximum API request rate",
            "retryAfterSeconds": 7
        }));

        let error = ToolError::from_raw(failure, "GetTitleData");
        assert_eq!(error.kind(), ErrorKind::RateLimit);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(error.code(), RATE_LIMIT_EXCEEDED);
    }

    #[test]
    fn test_from_raw_rate_limit_with_fractional_hint() {
        let failure = RawFailure::decode(json!({
            "code": 429,
            "error": "APIClientRequestRateLimitExceeded",
            "errorCode": 1199,
            "retryAfterSeconds": 1.5
        }));

        let error = ToolError::from_raw(failure, "GetTitleData");
        assert_eq!(error.kind(), ErrorKind::RateLimit);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_from_upstream_with_object_error_field() {
        let value = json!({ "error": { "message": "boom" }, "errorMessage": "boom" });

        assert!(is_upstream_error(&value));
        let error = ToolError::from_upstream(&value, "BanUsers");
        assert_eq!(error.kind(), ErrorKind::UpstreamApi);
        assert_eq!(error.message(), "boom");
    }

    #[test]
    fn test_from_raw_transport_keeps_status() {
        let error = ToolError::from_raw(
            RawFailure::transport("Network error: connection refused", Some(502)),
            "GetTitleData",
        );
        assert_eq!(error.kind(), ErrorKind::Generic);
        assert_eq!(error.status_code(), Some(502));
        assert_eq!(error.message(), "Network error: connection refused");
    }

    #[test]
    fn test_is_upstream_error() {
        assert!(is_upstream_error(&json!({ "error": "NotFound" })));
        assert!(!is_upstream_error(&json!({ "message": "nope" })));
    }

    #[test]
    fn test_unknown_tool_mentions_name() {
        let error = ToolError::unknown_tool("grant_gold");
        assert!(error.to_string().contains("grant_gold"));
        assert_eq!(error.code(), UNKNOWN_TOOL);
    }

    #[test]
    fn test_response_strips_details_in_production() {
        let error = ToolError::validation("PlayFabId is required")
            .with_details(json!({ "field": "PlayFabId" }));

        let dev = error.to_response(false);
        let prod = error.to_response(true);

        assert_eq!(dev.details, Some(json!({ "field": "PlayFabId" })));
        assert_eq!(prod.details, None);
        assert_eq!(prod.message, "PlayFabId is required");
        assert_eq!(prod.code, VALIDATION_ERROR);
        assert_eq!(prod.status_code, Some(400));
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let body = serde_json::to_value(ToolError::authentication("expired").to_response(true)).unwrap();
        assert_eq!(
            body,
            json!({
                "message": "expired",
                "code": AUTHENTICATION_ERROR,
                "statusCode": 401
            })
        );
    }
}
