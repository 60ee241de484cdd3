//! Resilience layer for outbound PlayFab calls.
//!
//! Decides which failures are worth another attempt, how long to wait
//! between attempts, and runs the retry loop itself. Policies are plain
//! values; the named presets cover player-facing, admin and bulk calls.

mod retry;

pub use retry::{
    compute_delay, execute_with_retry, is_retryable, PolicyOverride, RetryPolicy,
    DEFAULT_RETRYABLE_CODES,
};
