//! Authentication module for the PlayFab tools.
//!
//! Every outbound call needs a short-lived entity token. A [`TokenSource`]
//! knows how to obtain one; the [`TokenCache`] keeps the current
//! [`Credential`] and makes sure concurrent callers share a single refresh.

mod cache;
mod entity_token;

pub use cache::TokenCache;
pub use entity_token::{EntityTokenSource, GET_ENTITY_TOKEN};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::errors::RawFailure;

/// An entity token and the instant it stops being valid.
///
/// Credentials are never mutated; a refresh replaces the whole value.
#[derive(Clone)]
pub struct Credential {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential.
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_at,
        }
    }

    /// Returns the token value (exposing the secret).
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Returns the expiry instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Valid iff `now` is strictly before the expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Valid iff the current time is strictly before the expiry.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of fresh credentials.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Requests a new credential from the platform.
    async fn fetch_credential(&self) -> Result<Credential, RawFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validity_is_strict() {
        let expiry = Utc::now();
        let credential = Credential::new("tok", expiry);

        assert!(credential.is_valid_at(expiry - Duration::milliseconds(1)));
        assert!(!credential.is_valid_at(expiry));
        assert!(!credential.is_valid_at(expiry + Duration::seconds(1)));
    }

    #[test]
    fn test_future_expiry_is_valid() {
        let credential = Credential::new("tok", Utc::now() + Duration::hours(1));
        assert!(credential.is_valid());
        assert_eq!(credential.token(), "tok");
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("very-secret-token", Utc::now());
        let debug_str = format!("{:?}", credential);

        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("very-secret-token"));
    }
}
