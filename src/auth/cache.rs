//! Entity token cache with single-flight refresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;

use super::{Credential, TokenSource, GET_ENTITY_TOKEN};
use crate::errors::{RawFailure, ToolError, ToolResult};

/// A refresh that every concurrent caller can await.
type RefreshFuture = Shared<BoxFuture<'static, ToolResult<Credential>>>;

#[derive(Default)]
struct CacheState {
    credential: Option<Credential>,
    in_flight: Option<RefreshFuture>,
    /// Bumped by [`TokenCache::clear`]; a refresh only writes back into the
    /// generation it was started in.
    generation: u64,
}

/// Holds the current credential and coordinates refreshes.
///
/// While a refresh is in flight, every caller that finds no valid
/// credential joins it instead of starting another one. The refresh runs in
/// its own task, so it settles even when every caller stops waiting, and
/// the in-flight marker is cleared when it does, whatever its outcome.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    state: Arc<Mutex<CacheState>>,
}

impl TokenCache {
    /// Creates an empty cache backed by `source`.
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Returns a valid credential, refreshing it if needed.
    ///
    /// Refresh failures are not retried here; they surface as
    /// [`ToolError::Authentication`] to every caller of that refresh.
    /// Must be called from within a tokio runtime.
    pub async fn ensure_valid_credential(&self) -> ToolResult<Credential> {
        let refresh = {
            let mut state = self.state.lock();

            if let Some(credential) = state.credential.as_ref().filter(|c| c.is_valid()) {
                return Ok(credential.clone());
            }

            if let Some(pending) = state.in_flight.clone() {
                tracing::debug!("Joining in-flight entity token refresh");
                pending
            } else {
                // The lock is held until the marker is stored, so the task
                // cannot settle before it is visible.
                let pending = self.start_refresh(state.generation);
                state.in_flight = Some(pending.clone());
                pending
            }
        };

        refresh.await
    }

    fn start_refresh(&self, generation: u64) -> RefreshFuture {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                tracing::debug!(generation, "Refreshing entity token");
                let result = source.fetch_credential().await.map_err(refresh_error);

                let mut state = state.lock();
                if state.generation != generation {
                    tracing::debug!(generation, "Discarding entity token refresh after clear");
                    return result;
                }

                state.in_flight = None;
                match &result {
                    Ok(credential) => {
                        tracing::info!(expires_at = %credential.expires_at(), "Entity token refreshed");
                        state.credential = Some(credential.clone());
                    }
                    Err(err) => tracing::error!(error = %err, "Entity token refresh failed"),
                }

                result
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    let mut state = state.lock();
                    if state.generation == generation {
                        state.in_flight = None;
                    }
                    Err(ToolError::authentication(format!(
                        "Entity token refresh aborted: {}",
                        join_error
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Returns the cached credential without refreshing, valid or not.
    pub fn cached(&self) -> Option<Credential> {
        self.state.lock().credential.clone()
    }

    /// Returns true while a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Drops the cached credential so the next call refreshes.
    pub fn invalidate(&self) {
        self.state.lock().credential = None;
    }

    /// Resets the cache to its initial state.
    ///
    /// A refresh still running finishes for its current awaiters, but its
    /// outcome is no longer stored.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.credential = None;
        state.in_flight = None;
        state.generation += 1;
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TokenCache")
            .field("credential", &state.credential)
            .field("refreshing", &state.in_flight.is_some())
            .field("generation", &state.generation)
            .finish()
    }
}

fn refresh_error(failure: RawFailure) -> ToolError {
    let wrapped = ToolError::from_raw(failure, GET_ENTITY_TOKEN);
    let error = ToolError::authentication(format!(
        "Failed to obtain entity token: {}",
        wrapped.message()
    ));

    match wrapped.details() {
        Some(details) => error.with_details(details.clone()),
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, UpstreamError};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_credential(&self) -> Result<Credential, RawFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RawFailure::Platform(UpstreamError {
                    code: Some(401),
                    error: Some("NotAuthenticated".to_string()),
                    error_message: Some("Invalid secret key".to_string()),
                    ..Default::default()
                }));
            }
            Ok(Credential::new(
                format!("token-{}", n),
                Utc::now() + Duration::hours(1),
            ))
        }
    }

    fn cache(fail: bool) -> (TokenCache, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail,
        });
        (TokenCache::new(source.clone()), source)
    }

    #[tokio::test]
    async fn test_refresh_then_cached() {
        let (cache, source) = cache(false);

        let first = cache.ensure_valid_credential().await.unwrap();
        let second = cache.ensure_valid_credential().await.unwrap();

        assert_eq!(first.token(), "token-0");
        assert_eq!(second.token(), "token-0");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_refreshing());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let (cache, source) = cache(false);

        cache.ensure_valid_credential().await.unwrap();
        cache.invalidate();
        let refreshed = cache.ensure_valid_credential().await.unwrap();

        assert_eq!(refreshed.token(), "token-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_authentication_and_clears_marker() {
        let (cache, source) = cache(true);

        let err = cache.ensure_valid_credential().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.message().contains("Invalid secret key"));
        assert!(err.details().is_some());
        assert!(!cache.is_refreshing());
        assert!(cache.cached().is_none());

        let _ = cache.ensure_valid_credential().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
