//! Transport layer for the PlayFab API.
//!
//! Defines the response envelope every remote function resolves to and the
//! reqwest-backed [`PlatformClient`].

mod http;

pub use http::{PlatformClient, SDK_HEADER};

use serde::{Deserialize, Serialize};

/// Envelope of a PlayFab API answer.
///
/// A successful call carries its payload in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// HTTP status echoed in the body.
    pub code: Option<u16>,
    /// HTTP status text.
    pub status: Option<String>,
    /// The payload.
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful envelope around `data`.
    pub fn ok(data: T) -> Self {
        Self {
            code: Some(200),
            status: Some("OK".to_string()),
            data: Some(data),
        }
    }

    /// Creates a successful envelope without payload.
    pub fn empty() -> Self {
        Self {
            code: Some(200),
            status: Some("OK".to_string()),
            data: None,
        }
    }
}
