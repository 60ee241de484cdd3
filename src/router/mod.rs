//! Name-based tool dispatch.
//!
//! The [`Router`] maps tool names to [`Handler`]s. Handlers can be wrapped
//! in [`Middleware`], and [`compose`] builds a single middleware out of a
//! list: `compose([m1, m2])(h)` is `m1(m2(h))`, so `m1` runs first.

pub mod middleware;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::errors::{ErrorResponse, ToolError, ToolResult};

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, ToolResult<Value>>;

/// A tool implementation: arguments in, result out.
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// A handler transformation.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Wraps an async function as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult<Value>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Wraps a function as a [`Middleware`].
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Composes middlewares right to left into one.
///
/// The first middleware is the outermost wrapper.
pub fn compose<I>(middlewares: I) -> Middleware
where
    I: IntoIterator<Item = Middleware>,
{
    let chain: Vec<Middleware> = middlewares.into_iter().collect();
    Arc::new(move |inner: Handler| {
        chain
            .iter()
            .rev()
            .fold(inner, |wrapped, layer| layer(wrapped))
    })
}

/// A registered tool.
#[derive(Clone)]
pub struct Route {
    /// The tool implementation.
    pub handler: Handler,
    /// Human readable description.
    pub description: Option<String>,
}

impl Route {
    /// Creates a route without description.
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            description: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<Handler> for Route {
    fn from(handler: Handler) -> Self {
        Route::new(handler)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Tool name to handler registry.
///
/// Names are unique; registering an existing name replaces its handler.
#[derive(Default)]
pub struct Router {
    routes: RwLock<HashMap<String, Route>>,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous route.
    pub fn register(&self, name: impl Into<String>, handler: Handler, description: Option<&str>) {
        let route = Route {
            handler,
            description: description.map(str::to_string),
        };
        self.insert(name.into(), route);
    }

    /// Registers many routes at once.
    ///
    /// Accepts bare handlers or full [`Route`]s.
    pub fn register_batch<I, K, R>(&self, routes: I)
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: Into<Route>,
    {
        for (name, route) in routes {
            self.insert(name.into(), route.into());
        }
    }

    fn insert(&self, name: String, route: Route) {
        let mut routes = self.routes.write();
        if routes.contains_key(&name) {
            tracing::warn!(tool = %name, "Tool already registered, replacing handler");
        } else {
            tracing::debug!(tool = %name, "Registered tool");
        }
        routes.insert(name, route);
    }

    /// Returns true if `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        self.routes.read().contains_key(name)
    }

    /// Returns the handler registered under `name`.
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.routes
            .read()
            .get(name)
            .map(|route| Arc::clone(&route.handler))
    }

    /// Returns the description registered under `name`.
    pub fn description(&self, name: &str) -> Option<String> {
        self.routes
            .read()
            .get(name)
            .and_then(|route| route.description.clone())
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Returns true if no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Removes every route.
    pub fn clear(&self) {
        self.routes.write().clear();
    }

    /// Runs the handler registered under `name`.
    ///
    /// Handler results and errors are returned unchanged.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult<Value> {
        let Some(handler) = self.get(name) else {
            tracing::warn!(tool = %name, "Unknown tool requested");
            return Err(ToolError::unknown_tool(name));
        };

        tracing::debug!(tool = %name, "Executing tool");
        match handler(args).await {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::error!(tool = %name, error_code = err.code(), error = %err, "Tool execution failed");
                Err(err)
            }
        }
    }

    /// Runs a tool and shapes failures for the transport layer.
    ///
    /// Error details are dropped when `production` is set.
    pub async fn dispatch(
        &self,
        name: &str,
        args: Value,
        production: bool,
    ) -> Result<Value, ErrorResponse> {
        self.execute(name, args)
            .await
            .map_err(|err| err.to_response(production))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(value: Value) -> Handler {
        handler(move |_args| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    #[tokio::test]
    async fn test_execute_registered() {
        let router = Router::new();
        router.register("ping", constant(json!("pong")), Some("Health check"));

        assert!(router.has("ping"));
        assert_eq!(router.description("ping").as_deref(), Some("Health check"));
        assert_eq!(router.execute("ping", json!({})).await.unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let router = Router::new();
        router.register("tool", constant(json!(1)), None);
        router.register("tool", constant(json!(2)), None);

        assert_eq!(router.len(), 1);
        let handler = router.get("tool").unwrap();
        assert_eq!(handler(json!({})).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let router = Router::new();
        let err = router.execute("missing_tool", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("missing_tool"));
        assert!(router.get("missing_tool").is_none());
    }

    #[tokio::test]
    async fn test_handler_error_propagates_unchanged() {
        let router = Router::new();
        router.register(
            "fails",
            handler(|_args| async { Err(ToolError::validation("PlayFabId is required")) }),
            None,
        );

        let err = router.execute("fails", json!({})).await.unwrap_err();
        assert_eq!(err.message(), "PlayFabId is required");
        assert_eq!(err.code(), crate::errors::VALIDATION_ERROR);
    }

    #[test]
    fn test_register_batch_and_clear() {
        let router = Router::new();
        router.register_batch([
            ("a", Route::new(constant(json!(1))).with_description("first")),
            ("b", Route::from(constant(json!(2)))),
        ]);
        router.register_batch(vec![("c", constant(json!(3)))]);

        assert_eq!(router.names(), vec!["a", "b", "c"]);
        assert_eq!(router.description("a").as_deref(), Some("first"));
        assert_eq!(router.description("b"), None);

        router.clear();
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_shapes_errors() {
        let router = Router::new();
        let response = router.dispatch("nope", json!({}), true).await.unwrap_err();
        assert_eq!(response.code, crate::errors::UNKNOWN_TOOL);
        assert_eq!(response.details, None);
    }
}
