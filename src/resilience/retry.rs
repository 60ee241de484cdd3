//! Retry policy, error classification and the retry loop.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

use crate::errors::{ToolError, ToolResult};

/// Upstream error names treated as transient by every preset.
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &[
    "ServiceUnavailable",
    "InternalServerError",
    "DownstreamServiceUnavailable",
    "APIClientRequestRateLimitExceeded",
    "APIConcurrentRequestLimitExceeded",
    "ConcurrentEditError",
    "DataUpdateRateExceeded",
];

/// Substrings of plain error messages that indicate a network failure.
const NETWORK_ERROR_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection",
    "econnreset",
    "econnrefused",
    "enotfound",
    "socket hang up",
];

/// Jitter spread as a fraction of the computed delay.
const JITTER_RATIO: f64 = 0.1;

/// Retry tuning for one class of calls.
///
/// `max_delay` is expected to be at least `base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit for backoff.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Exponential (`base * 2^i`) instead of linear (`base * (i + 1)`) backoff.
    pub exponential_backoff: bool,
    /// Whether to add up to ±10% random jitter.
    pub jitter: bool,
    /// Upstream error codes considered transient.
    pub retryable_codes: &'static [&'static str],
}

impl RetryPolicy {
    /// Player-facing calls: fail fast.
    pub const STRICT: RetryPolicy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(10),
        exponential_backoff: true,
        jitter: true,
        retryable_codes: DEFAULT_RETRYABLE_CODES,
    };

    /// Admin calls.
    pub const STANDARD: RetryPolicy = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(15),
        exponential_backoff: true,
        jitter: true,
        retryable_codes: DEFAULT_RETRYABLE_CODES,
    };

    /// Batch operations: patient.
    pub const BULK: RetryPolicy = RetryPolicy {
        max_retries: 5,
        base_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(60),
        exponential_backoff: true,
        jitter: true,
        retryable_codes: DEFAULT_RETRYABLE_CODES,
    };

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets exponential or linear backoff.
    pub fn exponential_backoff(mut self, exponential: bool) -> Self {
        self.exponential_backoff = exponential;
        self
    }

    /// Sets whether to use jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the retryable upstream codes.
    pub fn retryable_codes(mut self, codes: &'static [&'static str]) -> Self {
        self.retryable_codes = codes;
        self
    }

    /// Creates a policy that never retries.
    pub fn no_retries() -> Self {
        Self::STANDARD.max_retries(0)
    }

    /// Returns this policy with every field set in `overrides` replaced.
    pub fn merged(self, overrides: &PolicyOverride) -> Self {
        Self {
            max_retries: overrides.max_retries.unwrap_or(self.max_retries),
            base_delay: overrides.base_delay.unwrap_or(self.base_delay),
            max_delay: overrides.max_delay.unwrap_or(self.max_delay),
            exponential_backoff: overrides
                .exponential_backoff
                .unwrap_or(self.exponential_backoff),
            jitter: overrides.jitter.unwrap_or(self.jitter),
            retryable_codes: overrides.retryable_codes.unwrap_or(self.retryable_codes),
        }
    }

    /// Runs `operation` under this policy.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ToolResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ToolResult<T>>,
    {
        execute_with_retry(self, operation).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Partial policy merged over a base policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverride {
    /// Replaces `max_retries`.
    pub max_retries: Option<u32>,
    /// Replaces `base_delay`.
    pub base_delay: Option<Duration>,
    /// Replaces `max_delay`.
    pub max_delay: Option<Duration>,
    /// Replaces `exponential_backoff`.
    pub exponential_backoff: Option<bool>,
    /// Replaces `jitter`.
    pub jitter: Option<bool>,
    /// Replaces `retryable_codes`.
    pub retryable_codes: Option<&'static [&'static str]>,
}

impl PolicyOverride {
    /// Creates an empty override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Overrides the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Overrides the maximum delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Overrides the backoff shape.
    pub fn exponential_backoff(mut self, exponential: bool) -> Self {
        self.exponential_backoff = Some(exponential);
        self
    }

    /// Overrides jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Overrides the retryable codes.
    pub fn retryable_codes(mut self, codes: &'static [&'static str]) -> Self {
        self.retryable_codes = Some(codes);
        self
    }
}

impl From<RetryPolicy> for PolicyOverride {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_retries: Some(policy.max_retries),
            base_delay: Some(policy.base_delay),
            max_delay: Some(policy.max_delay),
            exponential_backoff: Some(policy.exponential_backoff),
            jitter: Some(policy.jitter),
            retryable_codes: Some(policy.retryable_codes),
        }
    }
}

/// Decides whether `error` is worth another attempt under `policy`.
pub fn is_retryable(error: &ToolError, policy: &RetryPolicy) -> bool {
    match error {
        ToolError::RateLimit { .. } => true,
        ToolError::Authentication { .. } => false,
        ToolError::UpstreamApi { upstream, .. } => upstream
            .as_ref()
            .and_then(|u| u.code_name())
            .is_some_and(|code| policy.retryable_codes.contains(&code.as_str())),
        _ => match error.status_code() {
            Some(status) => status >= 500 || status == 408 || status == 429,
            None => {
                let message = error.message().to_lowercase();
                NETWORK_ERROR_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
        },
    }
}

/// Delay before the retry following attempt `attempt` (zero based).
///
/// A retry-after hint wins over backoff math. The result never exceeds
/// `policy.max_delay`.
pub fn compute_delay(attempt: u32, policy: &RetryPolicy, retry_after: Option<Duration>) -> Duration {
    if let Some(hint) = retry_after {
        return hint.min(policy.max_delay);
    }

    let base_ms = policy.base_delay.as_millis() as f64;
    let max_ms = policy.max_delay.as_millis() as f64;

    let delay_ms = if policy.exponential_backoff {
        base_ms * 2f64.powi(attempt.min(i32::MAX as u32) as i32)
    } else {
        base_ms * (f64::from(attempt) + 1.0)
    };

    let delay_ms = if policy.jitter {
        let spread = rand::thread_rng().gen_range(-JITTER_RATIO..=JITTER_RATIO);
        delay_ms + delay_ms * spread
    } else {
        delay_ms
    };

    Duration::from_millis(delay_ms.clamp(0.0, max_ms).round() as u64)
}

/// One failed try inside a retry loop.
struct CallAttempt<'a> {
    index: u32,
    error: &'a ToolError,
    delay: Duration,
}

impl CallAttempt<'_> {
    fn log(&self, max_retries: u32) {
        tracing::info!(
            attempt = self.index + 1,
            max_retries,
            delay_ms = self.delay.as_millis() as u64,
            error_kind = ?self.error.kind(),
            error = %self.error,
            "Retrying after error"
        );
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's retry budget is spent.
///
/// Attempts are strictly sequential. The last observed error is returned
/// unchanged.
#[instrument(skip_all, fields(max_retries = policy.max_retries))]
pub async fn execute_with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> ToolResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ToolResult<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= policy.max_retries {
                    tracing::debug!(attempts = attempt + 1, error = %err, "Retry budget exhausted");
                    return Err(err);
                }

                if !is_retryable(&err, policy) {
                    tracing::debug!(attempts = attempt + 1, error = %err, "Error is not retryable");
                    return Err(err);
                }

                let delay = compute_delay(attempt, policy, err.retry_after());
                CallAttempt {
                    index: attempt,
                    error: &err,
                    delay,
                }
                .log(policy.max_retries);

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UpstreamError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use test_case::test_case;

    fn fixed(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy::STANDARD
            .base_delay(Duration::from_millis(base_ms))
            .max_delay(Duration::from_millis(max_ms))
            .jitter(false)
    }

    fn upstream_named(name: &str) -> ToolError {
        ToolError::upstream(
            UpstreamError {
                code: Some(503),
                error: Some(name.to_string()),
                ..Default::default()
            },
            "GetTitleData",
        )
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::STRICT.max_retries, 2);
        assert_eq!(RetryPolicy::STRICT.base_delay, Duration::from_secs(2));
        assert_eq!(RetryPolicy::STRICT.max_delay, Duration::from_secs(10));
        assert_eq!(RetryPolicy::STANDARD.max_retries, 3);
        assert_eq!(RetryPolicy::STANDARD.max_delay, Duration::from_secs(15));
        assert_eq!(RetryPolicy::BULK.max_retries, 5);
        assert_eq!(RetryPolicy::BULK.base_delay, Duration::from_secs(5));
        assert_eq!(RetryPolicy::BULK.max_delay, Duration::from_secs(60));

        for preset in [RetryPolicy::STRICT, RetryPolicy::STANDARD, RetryPolicy::BULK] {
            assert!(preset.exponential_backoff);
            assert!(preset.jitter);
            assert!(preset.max_delay >= preset.base_delay);
        }
    }

    #[test]
    fn test_merged_keeps_unset_fields() {
        let merged = RetryPolicy::STANDARD.merged(&PolicyOverride::new().max_retries(7));
        assert_eq!(merged.max_retries, 7);
        assert_eq!(merged.base_delay, RetryPolicy::STANDARD.base_delay);
        assert_eq!(merged.max_delay, RetryPolicy::STANDARD.max_delay);

        let full = RetryPolicy::STANDARD.merged(&PolicyOverride::from(RetryPolicy::BULK));
        assert_eq!(full, RetryPolicy::BULK);
    }

    #[test_case(408, true ; "request timeout")]
    #[test_case(429, true ; "too many requests")]
    #[test_case(500, true ; "internal error")]
    #[test_case(503, true ; "unavailable")]
    #[test_case(400, false ; "bad request")]
    #[test_case(404, false ; "not found")]
    fn test_status_classification(status: u16, expected: bool) {
        let error = ToolError::with_status("failed", status);
        assert_eq!(is_retryable(&error, &RetryPolicy::STANDARD), expected);
    }

    #[test_case("ECONNRESET by peer", true ; "reset")]
    #[test_case("Network unreachable", true ; "network")]
    #[test_case("request timeout", true ; "timeout")]
    #[test_case("getaddrinfo ENOTFOUND", true ; "dns")]
    #[test_case("No data returned from GetTitleData", false ; "contract violation")]
    fn test_message_classification(message: &str, expected: bool) {
        let error = ToolError::generic(message);
        assert_eq!(is_retryable(&error, &RetryPolicy::STANDARD), expected);
    }

    #[test]
    fn test_kind_classification() {
        let policy = RetryPolicy::STANDARD;
        assert!(is_retryable(&ToolError::rate_limit("slow", None), &policy));
        assert!(!is_retryable(&ToolError::authentication("timeout"), &policy));
        assert!(!is_retryable(&ToolError::validation("connection"), &policy));
        assert!(is_retryable(&upstream_named("ServiceUnavailable"), &policy));
        assert!(!is_retryable(&upstream_named("InvalidParams"), &policy));
    }

    #[test]
    fn test_upstream_code_set_comes_from_policy() {
        static ONLY_CUSTOM: &[&str] = &["CustomTransient"];
        let policy = RetryPolicy::STANDARD.retryable_codes(ONLY_CUSTOM);

        assert!(is_retryable(&upstream_named("CustomTransient"), &policy));
        assert!(!is_retryable(&upstream_named("ServiceUnavailable"), &policy));
    }

    #[test]
    fn test_unrecognized_upstream_is_not_retryable() {
        let error = ToolError::from_upstream(&serde_json::json!("boom"), "GetTitleData");
        assert!(!is_retryable(&error, &RetryPolicy::STANDARD));
    }

    #[test]
    fn test_exponential_delay() {
        let policy = fixed(100, 1_000);
        assert_eq!(compute_delay(0, &policy, None).as_millis(), 100);
        assert_eq!(compute_delay(1, &policy, None).as_millis(), 200);
        assert_eq!(compute_delay(2, &policy, None).as_millis(), 400);
        assert_eq!(compute_delay(3, &policy, None).as_millis(), 800);
        assert_eq!(compute_delay(4, &policy, None).as_millis(), 1_000);
        assert_eq!(compute_delay(60, &policy, None).as_millis(), 1_000);
    }

    #[test]
    fn test_linear_delay() {
        let policy = fixed(100, 1_000).exponential_backoff(false);
        for attempt in 0..9 {
            assert_eq!(
                compute_delay(attempt, &policy, None).as_millis(),
                100 * (u128::from(attempt) + 1)
            );
        }
        assert_eq!(compute_delay(20, &policy, None).as_millis(), 1_000);
    }

    #[test]
    fn test_delay_is_monotonic_without_jitter() {
        let policy = fixed(250, 15_000);
        let delays: Vec<_> = (0..12).map(|i| compute_delay(i, &policy, None)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }

    #[test]
    fn test_retry_after_hint_wins() {
        let policy = fixed(100, 15_000);
        for attempt in [0, 3, 9] {
            assert_eq!(
                compute_delay(attempt, &policy, Some(Duration::from_secs(4))),
                Duration::from_secs(4)
            );
            assert_eq!(
                compute_delay(attempt, &policy, Some(Duration::from_secs(120))),
                Duration::from_secs(15)
            );
        }
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = fixed(1_000, 60_000).jitter(true);
        for _ in 0..200 {
            let delay = compute_delay(1, &policy, None).as_millis();
            assert!((1_800..=2_200).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let result = execute_with_retry(&RetryPolicy::STANDARD, || async {
            Ok::<_, ToolError>("success")
        })
        .await;

        assert_eq!(result.unwrap(), "success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = fixed(10, 100)
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ToolError::with_status("unavailable", 503))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: ToolResult<()> = fixed(10, 100)
            .max_retries(2)
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err(ToolError::with_status(format!("failure {}", n), 500))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().message(), "failure 2");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
