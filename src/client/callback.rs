//! Adapter for callback-style remote functions.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::RawFailure;
use crate::transport::ApiResponse;

/// Completion callback of a callback-style remote function: `(error, result)`.
pub type Callback<T> = Box<dyn FnOnce(Option<Value>, Option<ApiResponse<T>>) + Send>;

/// Turns one callback-style invocation into an awaitable result.
///
/// The error value, if any, is decoded into a [`RawFailure`]. A callback
/// dropped without being invoked resolves to a transport failure instead of
/// hanging forever.
pub async fn from_callback<Req, T, F>(remote: F, request: Req) -> Result<ApiResponse<T>, RawFailure>
where
    F: FnOnce(Req, Callback<T>),
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    remote(
        request,
        Box::new(move |error: Option<Value>, result: Option<ApiResponse<T>>| {
            let _ = tx.send((error, result));
        }),
    );

    match rx.await {
        Ok((Some(error), _)) => Err(RawFailure::decode(error)),
        Ok((None, Some(result))) => Ok(result),
        Ok((None, None)) => Ok(ApiResponse {
            code: None,
            status: None,
            data: None,
        }),
        Err(_) => Err(RawFailure::transport(
            "Remote callback was dropped without being invoked",
            None,
        )),
    }
}
