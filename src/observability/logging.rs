//! Logging configuration and secret redaction.

use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
    /// Off (no logging).
    Off,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "off" => Some(LogLevel::Off),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level, used when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Emit JSON lines instead of human readable output.
    pub json: bool,
    /// Include the event target.
    pub with_target: bool,
    /// Redact sensitive data.
    pub redact_sensitive: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            with_target: true,
            redact_sensitive: true,
        }
    }
}

impl LogConfig {
    /// Creates a new log configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `LOG_LEVEL` and `LOG_FORMAT` (`json` or `text`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name
    /// to its value. Unknown levels keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup("LOG_LEVEL").and_then(|v| LogLevel::parse(&v)) {
            config.level = level;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            config.json = format.trim().eq_ignore_ascii_case("json");
        }

        config
    }

    /// Sets the log level.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Switches to JSON output.
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Disables sensitive data redaction.
    pub fn no_redact(mut self) -> Self {
        self.redact_sensitive = false;
        self
    }
}

/// Key fragments whose values are never logged.
const SENSITIVE_KEYS: &[&str] = &[
    "secret",
    "token",
    "password",
    "ticket",
    "apikey",
    "api_key",
    "authorization",
];

/// Replacement text for redacted values.
pub const REDACTED: &str = "***";

fn text_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)x-secretkey[=:]\s*[^\s,}]+", "X-SecretKey: ***"),
            (r"(?i)x-entitytoken[=:]\s*[^\s,}]+", "X-EntityToken: ***"),
            (r"Bearer [a-zA-Z0-9._-]+", "Bearer ***"),
            (r"(?i)secret[_-]?key[=:][^\s,}]+", "secret_key=***"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
        .collect()
    })
}

static REDACT_SENSITIVE: AtomicBool = AtomicBool::new(true);

/// Turns redaction of logged payloads on or off process-wide.
///
/// [`crate::observability::init_logging`] applies
/// [`LogConfig::redact_sensitive`] through this.
pub fn set_redaction(enabled: bool) {
    REDACT_SENSITIVE.store(enabled, Ordering::Relaxed);
}

/// Returns true when logged payloads are redacted.
pub fn redaction_enabled() -> bool {
    REDACT_SENSITIVE.load(Ordering::Relaxed)
}

/// Prepares a JSON payload for a log line.
pub fn loggable_value(value: &Value) -> Value {
    if redaction_enabled() {
        redact_value(value)
    } else {
        value.clone()
    }
}

/// Prepares free text for a log line.
pub fn loggable_text(text: &str) -> String {
    if redaction_enabled() {
        redact_text(text)
    } else {
        text.to_string()
    }
}

/// Redacts credentials embedded in free text.
pub fn redact_text(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in text_patterns() {
        result = re.replace_all(&result, *replacement).to_string();
    }
    result
}

/// Returns a copy of `value` with sensitive fields masked.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let lowered = key.to_ascii_lowercase();
                    let masked = if SENSITIVE_KEYS.iter().any(|s| lowered.contains(s)) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(v)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}
