//! Configuration module for the PlayFab tools.
//!
//! Holds the title credentials, endpoint and timeouts, and the production
//! flag that decides whether error details leave the process.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

use crate::errors::{ToolError, ToolResult};

/// Default HTTP request timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Value of `APP_ENV` that turns on production mode.
pub const PRODUCTION_ENV: &str = "production";

/// Configuration for the PlayFab tools.
#[derive(Clone)]
pub struct PlayFabConfig {
    /// Title identifier.
    pub title_id: String,
    /// Developer secret key (stored securely).
    pub(crate) secret_key: SecretString,
    /// Base URL for API requests.
    pub base_url: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Optional timeout imposed on each call attempt.
    pub attempt_timeout: Option<Duration>,
    /// Production mode strips error details from responses.
    pub production: bool,
}

impl PlayFabConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> PlayFabConfigBuilder {
        PlayFabConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PLAYFAB_TITLE_ID` (required): title identifier
    /// - `PLAYFAB_DEV_SECRET_KEY` (required): developer secret key
    /// - `PLAYFAB_BASE_URL` (optional): custom base URL
    /// - `PLAYFAB_TIMEOUT` (optional): request timeout in seconds
    /// - `PLAYFAB_ATTEMPT_TIMEOUT` (optional): per-attempt timeout in seconds
    /// - `APP_ENV` (optional): `production` enables production mode
    pub fn from_env() -> ToolResult<Self> {
        let title_id = required_env("PLAYFAB_TITLE_ID")?;
        let secret_key = required_env("PLAYFAB_DEV_SECRET_KEY")?;

        let mut builder = PlayFabConfigBuilder::new()
            .title_id(title_id)
            .secret_key(secret_key);

        if let Ok(base_url) = std::env::var("PLAYFAB_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        if let Some(secs) = seconds_env("PLAYFAB_TIMEOUT") {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(secs) = seconds_env("PLAYFAB_ATTEMPT_TIMEOUT") {
            builder = builder.attempt_timeout(Duration::from_secs(secs));
        }

        let production = std::env::var("APP_ENV")
            .map(|env| env.eq_ignore_ascii_case(PRODUCTION_ENV))
            .unwrap_or(false);

        builder.production(production).build()
    }

    /// Returns the secret key (exposing the secret).
    pub(crate) fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    /// Returns the full URL for an API path.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for PlayFabConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayFabConfig")
            .field("title_id", &self.title_id)
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("production", &self.production)
            .finish()
    }
}

fn required_env(name: &str) -> ToolResult<String> {
    std::env::var(name)
        .map_err(|_| ToolError::generic(format!("{} environment variable not set", name)))
}

fn seconds_env(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

/// Builder for `PlayFabConfig`.
#[derive(Default)]
pub struct PlayFabConfigBuilder {
    title_id: Option<String>,
    secret_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
    production: bool,
}

impl PlayFabConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title identifier.
    pub fn title_id(mut self, title_id: impl Into<String>) -> Self {
        self.title_id = Some(title_id.into());
        self
    }

    /// Sets the developer secret key.
    pub fn secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the HTTP request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets a timeout for each individual call attempt.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Enables or disables production mode.
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ToolResult<PlayFabConfig> {
        let title_id = self
            .title_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ToolError::validation("Title ID is required"))?;

        let secret_key = self
            .secret_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ToolError::validation("Developer secret key is required"))?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| format!("https://{}.playfabapi.com", title_id))
            .trim_end_matches('/')
            .to_string();

        let parsed = Url::parse(&base_url)?;
        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(ToolError::validation(format!(
                "Unsupported base URL scheme: {}",
                parsed.scheme()
            )));
        }

        Ok(PlayFabConfig {
            title_id,
            secret_key: SecretString::new(secret_key),
            base_url,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            attempt_timeout: self.attempt_timeout,
            production: self.production,
        })
    }
}
