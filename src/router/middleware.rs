//! Middleware library for tool handlers.

use futures::future::FutureExt;
use serde_json::Value;
use std::sync::Arc;

use super::{Handler, Middleware};
use crate::errors::ToolResult;
use crate::observability::{loggable_text, loggable_value};
use crate::resilience::{execute_with_retry, RetryPolicy};

/// Logs the (redacted) arguments before and the outcome after each call.
pub fn logging(tool: impl Into<String>) -> Middleware {
    let tool: Arc<str> = Arc::from(tool.into());
    Arc::new(move |next: Handler| {
        let tool = Arc::clone(&tool);
        let wrapped: Handler = Arc::new(move |args: Value| {
            let next = Arc::clone(&next);
            let tool = Arc::clone(&tool);
            async move {
                tracing::info!(tool = %tool, args = %loggable_value(&args), "Tool called");
                let result = next(args).await;
                match &result {
                    Ok(value) => {
                        tracing::info!(tool = %tool, result = %loggable_value(value), "Tool succeeded");
                    }
                    Err(err) => {
                        tracing::warn!(tool = %tool, error = %loggable_text(&err.to_string()), "Tool failed");
                    }
                }
                result
            }
            .boxed()
        });
        wrapped
    })
}

/// Runs `validator` against the arguments before delegating.
///
/// A failing validator aborts the chain; the wrapped handler is not called.
pub fn validation<V>(validator: V) -> Middleware
where
    V: Fn(&Value) -> ToolResult<()> + Send + Sync + 'static,
{
    let validator = Arc::new(validator);
    Arc::new(move |next: Handler| {
        let validator = Arc::clone(&validator);
        let wrapped: Handler = Arc::new(move |args: Value| {
            if let Err(err) = validator(&args) {
                return futures::future::ready(Err(err)).boxed();
            }
            next(args)
        });
        wrapped
    })
}

/// Re-runs the whole handler invocation under `policy`.
pub fn retry(policy: RetryPolicy) -> Middleware {
    Arc::new(move |next: Handler| {
        let wrapped: Handler = Arc::new(move |args: Value| {
            let next = Arc::clone(&next);
            async move { execute_with_retry(&policy, || next(args.clone())).await }.boxed()
        });
        wrapped
    })
}
