//! Mock implementations for testing.
//!
//! Provides a scripted token source and a scripted remote API so the call
//! wrapper, token cache and tools can be exercised without network access.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::auth::{Credential, TokenSource};
use crate::errors::{RawFailure, UpstreamError};
use crate::tools::RemoteApi;
use crate::transport::ApiResponse;

/// Token source that counts refreshes and can be slowed down or failed.
pub struct MockTokenSource {
    calls: AtomicU32,
    latency: Option<Duration>,
    failure: Mutex<Option<RawFailure>>,
    lifetime: chrono::Duration,
}

impl Default for MockTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTokenSource {
    /// Issues `token-{n}` credentials valid for one hour.
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            latency: None,
            failure: Mutex::new(None),
            lifetime: chrono::Duration::hours(1),
        }
    }

    /// Delays every refresh by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Issues credentials with the given lifetime. Negative values yield
    /// already expired credentials.
    pub fn with_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Fails every refresh with `failure` until [`MockTokenSource::recover`].
    pub fn failing(self, failure: RawFailure) -> Self {
        *self.failure.lock() = Some(failure);
        self
    }

    /// Stops failing.
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Number of refreshes performed.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn fetch_credential(&self) -> Result<Credential, RawFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failure.lock().clone();
        match failure {
            Some(failure) => Err(failure),
            None => Ok(Credential::new(
                format!("token-{}", n),
                Utc::now() + self.lifetime,
            )),
        }
    }
}

/// One scripted reply of a [`ScriptedRemote`].
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Envelope carrying `data`.
    Data(Value),
    /// Envelope without `data`.
    Empty,
    /// A failure delivered as the error.
    Fail(RawFailure),
    /// Never completes.
    Hang,
}

impl Scripted {
    /// Platform error with the given HTTP code and error name.
    pub fn platform(code: u16, error: &str) -> Self {
        Scripted::Fail(RawFailure::Platform(UpstreamError {
            code: Some(code),
            error: Some(error.to_string()),
            error_message: Some(format!("{} ({})", error, code)),
            ..Default::default()
        }))
    }
}

/// A call observed by a [`ScriptedRemote`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// API path, when invoked through [`RemoteApi`].
    pub path: Option<String>,
    /// Token the call was made with.
    pub token: String,
    /// Request payload.
    pub request: Value,
    /// When the call started.
    pub at: Instant,
}

/// Remote API that replays queued outcomes and records every call.
///
/// When the queue is empty, the last outcome is repeated.
pub struct ScriptedRemote {
    outcomes: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRemote {
    /// Creates a remote with no scripted outcomes.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Queues an outcome.
    pub fn then(self, outcome: Scripted) -> Self {
        self.outcomes.lock().push_back(outcome);
        self
    }

    /// Queues a successful reply.
    pub fn then_data(self, data: Value) -> Self {
        self.then(Scripted::Data(data))
    }

    /// Queues a failure.
    pub fn then_fail(self, failure: RawFailure) -> Self {
        self.then(Scripted::Fail(failure))
    }

    /// Delays every reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Start instants of every call, in order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|call| call.at).collect()
    }

    /// Binds this remote as a call wrapper remote function.
    pub fn bind(
        self: &Arc<Self>,
    ) -> impl Fn(Credential, Value) -> BoxFuture<'static, Result<ApiResponse<Value>, RawFailure>>
           + Send
           + Sync
           + 'static {
        let remote = Arc::clone(self);
        move |credential, request| {
            let remote = Arc::clone(&remote);
            async move { remote.invoke(credential, request).await }.boxed()
        }
    }

    /// Handles one call.
    pub async fn invoke(
        &self,
        credential: Credential,
        request: Value,
    ) -> Result<ApiResponse<Value>, RawFailure> {
        self.reply(None, credential, request).await
    }

    async fn reply(
        &self,
        path: Option<&str>,
        credential: Credential,
        request: Value,
    ) -> Result<ApiResponse<Value>, RawFailure> {
        self.calls.lock().push(RecordedCall {
            path: path.map(str::to_string),
            token: credential.token().to_string(),
            request,
            at: Instant::now(),
        });

        let outcome = self.next_outcome();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match outcome {
            Some(Scripted::Data(data)) => Ok(ApiResponse::ok(data)),
            Some(Scripted::Empty) => Ok(ApiResponse::empty()),
            Some(Scripted::Fail(failure)) => Err(failure),
            Some(Scripted::Hang) => futures::future::pending().await,
            None => Err(RawFailure::transport("No scripted outcome", None)),
        }
    }

    fn next_outcome(&self) -> Option<Scripted> {
        let next = self.outcomes.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                Some(outcome)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn invoke(
        &self,
        path: &str,
        credential: Credential,
        request: Value,
    ) -> Result<ApiResponse<Value>, RawFailure> {
        self.reply(Some(path), credential, request).await
    }
}
