//! Observability module for the PlayFab tools.
//!
//! Provides subscriber setup, secret redaction for logged payloads, and a
//! timer used to log every outbound call attempt.

mod logging;

pub use logging::{
    loggable_text, loggable_value, redact_text, redact_value, redaction_enabled, set_redaction,
    LogConfig, LogLevel, REDACTED,
};

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use crate::errors::{ToolError, ToolResult};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Output goes to stderr so
/// that a stdout-based transport stays clean. Fails if a global subscriber
/// is already installed.
pub fn init_logging(config: &LogConfig) -> ToolResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| ToolError::generic(format!("Failed to initialize logging: {}", e)))?;
    set_redaction(config.redact_sensitive);
    Ok(())
}

/// Measures one outbound call attempt and logs its outcome.
#[derive(Debug)]
pub struct CallTimer {
    start: Instant,
    operation: String,
}

impl CallTimer {
    /// Starts timing `operation`.
    pub fn start(operation: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.into(),
        }
    }

    /// Returns the elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Logs a successful attempt.
    pub fn success(&self, attempt: u32) {
        tracing::debug!(
            method = %self.operation,
            attempt,
            duration_ms = self.elapsed().as_millis() as u64,
            success = true,
            "PlayFab call completed"
        );
    }

    /// Logs a failed attempt.
    pub fn failure(&self, attempt: u32, error: &ToolError) {
        tracing::warn!(
            method = %self.operation,
            attempt,
            duration_ms = self.elapsed().as_millis() as u64,
            success = false,
            error_code = error.code(),
            error = %loggable_text(&error.to_string()),
            "PlayFab call failed"
        );
    }
}
