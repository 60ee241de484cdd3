//! Decoding of raw failures reported by the PlayFab platform.
//!
//! This is the only place where the shape of an upstream error is inspected.
//! Everything past the call boundary sees a [`ToolError`](super::ToolError).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error names PlayFab uses when a client is being throttled.
pub const RATE_LIMIT_ERROR_NAMES: &[&str] = &[
    "APIClientRequestRateLimitExceeded",
    "APIConcurrentRequestLimitExceeded",
];

/// Numeric error codes matching [`RATE_LIMIT_ERROR_NAMES`].
pub const RATE_LIMIT_ERROR_CODES: &[i64] = &[1199, 1342];

/// Error body returned by the PlayFab API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamError {
    /// HTTP status echoed in the body.
    pub code: Option<u16>,
    /// HTTP status text, e.g. `TooManyRequests`.
    pub status: Option<String>,
    /// Symbolic error name, e.g. `ServiceUnavailable`.
    pub error: Option<String>,
    /// Numeric platform error code.
    pub error_code: Option<i64>,
    /// Human readable message.
    pub error_message: Option<String>,
    /// Per-field or per-item details.
    pub error_details: Option<Value>,
    /// Server supplied backoff hint.
    pub retry_after_seconds: Option<u64>,
}

impl UpstreamError {
    /// Structural check: does `value` look like a platform error body?
    ///
    /// Any JSON object carrying at least one of `error`, `errorCode` or
    /// `errorMessage` is accepted, whatever the field types. Each field is
    /// then read on its own; a field of an unexpected type is coerced when
    /// possible and dropped otherwise.
    pub fn recognize(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let looks_upstream = ["error", "errorCode", "errorMessage"]
            .iter()
            .any(|field| object.contains_key(*field));

        if !looks_upstream {
            return None;
        }

        Some(Self {
            code: object
                .get("code")
                .and_then(lenient_u64)
                .and_then(|code| u16::try_from(code).ok()),
            status: object.get("status").and_then(lenient_text),
            error: object.get("error").and_then(lenient_text),
            error_code: object.get("errorCode").and_then(lenient_i64),
            error_message: object.get("errorMessage").and_then(lenient_text),
            error_details: object
                .get("errorDetails")
                .filter(|details| !details.is_null())
                .cloned(),
            retry_after_seconds: object.get("retryAfterSeconds").and_then(lenient_seconds),
        })
    }

    /// Machine-readable code used for retry classification.
    ///
    /// Prefers the symbolic name and falls back to the numeric code.
    pub fn code_name(&self) -> Option<String> {
        self.error
            .clone()
            .or_else(|| self.error_code.map(|code| code.to_string()))
    }

    /// Best available human message.
    pub fn message(&self) -> Option<&str> {
        self.error_message.as_deref().or(self.error.as_deref())
    }

    /// Returns true when the body signals upstream throttling.
    pub fn is_rate_limited(&self) -> bool {
        self.code == Some(429)
            || self.status.as_deref() == Some("TooManyRequests")
            || self
                .error
                .as_deref()
                .is_some_and(|name| RATE_LIMIT_ERROR_NAMES.contains(&name))
            || self
                .error_code
                .is_some_and(|code| RATE_LIMIT_ERROR_CODES.contains(&code))
    }
}

fn lenient_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_u64(value: &Value) -> Option<u64> {
    lenient_i64(value).and_then(|n| u64::try_from(n).ok())
}

/// Whole seconds, rounded up so a fractional hint is never shortened.
fn lenient_seconds(value: &Value) -> Option<u64> {
    let seconds = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.ceil() as u64)
}

/// A failure as it arrives from a remote function, decoded once.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// The platform answered with an error body.
    Platform(UpstreamError),
    /// The request never produced a platform answer.
    Transport {
        /// Description of the failure.
        message: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
    },
    /// Anything else.
    Unknown(Value),
}

impl RawFailure {
    /// Decodes an arbitrary value reported through a callback.
    pub fn decode(value: Value) -> Self {
        match UpstreamError::recognize(&value) {
            Some(upstream) => RawFailure::Platform(upstream),
            None => RawFailure::Unknown(value),
        }
    }

    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        RawFailure::Transport {
            message: message.into(),
            status,
        }
    }
}

impl From<UpstreamError> for RawFailure {
    fn from(err: UpstreamError) -> Self {
        RawFailure::Platform(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recognize_platform_body() {
        let value = json!({
            "code": 503,
            "status": "ServiceUnavailable",
            "error": "ServiceUnavailable",
            "errorCode": 1123,
            "errorMessage": "try later"
        });

        let upstream = UpstreamError::recognize(&value).unwrap();
        assert_eq!(upstream.code, Some(503));
        assert_eq!(upstream.code_name().as_deref(), Some("ServiceUnavailable"));
        assert_eq!(upstream.message(), Some("try later"));
    }

    #[test]
    fn test_recognize_single_field_is_enough() {
        assert!(UpstreamError::recognize(&json!({ "errorMessage": "boom" })).is_some());
        assert!(UpstreamError::recognize(&json!({ "errorCode": 1000 })).is_some());
    }

    #[test]
    fn test_recognize_rejects_other_shapes() {
        assert!(UpstreamError::recognize(&json!({ "message": "boom" })).is_none());
        assert!(UpstreamError::recognize(&json!("boom")).is_none());
        assert!(UpstreamError::recognize(&Value::Null).is_none());
    }

    #[test]
    fn test_code_name_falls_back_to_numeric() {
        let upstream = UpstreamError {
            error_code: Some(1123),
            ..Default::default()
        };
        assert_eq!(upstream.code_name().as_deref(), Some("1123"));
    }

    #[test]
    fn test_rate_limit_signatures() {
        let by_status = UpstreamError {
            code: Some(429),
            ..Default::default()
        };
        let by_name = UpstreamError {
            error: Some("APIClientRequestRateLimitExceeded".to_string()),
            ..Default::default()
        };
        let by_code = UpstreamError {
            error_code: Some(1199),
            ..Default::default()
        };
        let other = UpstreamError {
            code: Some(400),
            error: Some("InvalidParams".to_string()),
            ..Default::default()
        };

        assert!(by_status.is_rate_limited());
        assert!(by_name.is_rate_limited());
        assert!(by_code.is_rate_limited());
        assert!(!other.is_rate_limited());
    }

    #[test]
    fn test_recognize_tolerates_mistyped_fields() {
        let value = json!({
            "code": 70000,
            "error": { "message": "boom" },
            "errorCode": "1123",
            "errorMessage": "boom",
            "errorDetails": null
        });

        let upstream = UpstreamError::recognize(&value).unwrap();
        assert_eq!(upstream.code, None);
        assert_eq!(upstream.error.as_deref(), Some("boom"));
        assert_eq!(upstream.error_code, Some(1123));
        assert_eq!(upstream.error_details, None);
        assert!(crate::errors::is_upstream_error(&value));
    }

    #[test]
    fn test_recognize_keeps_throttling_with_fractional_hint() {
        let failure = RawFailure::decode(json!({
            "code": 429,
            "error": "APIClientRequestRateLimitExceeded",
            "errorCode": 1199,
            "retryAfterSeconds": 1.5
        }));

        let RawFailure::Platform(upstream) = failure else {
            panic!("Expected platform failure, got {:?}", failure);
        };
        assert!(upstream.is_rate_limited());
        assert_eq!(upstream.retry_after_seconds, Some(2));
    }

    #[test]
    fn test_recognize_drops_unusable_hint() {
        let upstream = UpstreamError::recognize(&json!({
            "error": "TooManyRequests",
            "retryAfterSeconds": -3,
            "status": 429
        }))
        .unwrap();

        assert_eq!(upstream.retry_after_seconds, None);
        assert_eq!(upstream.status.as_deref(), Some("429"));
    }

    #[test]
    fn test_decode_unknown_value() {
        let failure = RawFailure::decode(json!({ "oops": true }));
        assert!(matches!(failure, RawFailure::Unknown(_)));
    }
}
