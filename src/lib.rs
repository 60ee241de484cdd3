//! PlayFab Tools
//!
//! Exposes PlayFab admin, economy and player APIs as named tools behind a
//! uniform request/response interface, meant to be driven by an automated
//! client such as an LLM agent.
//!
//! # Features
//!
//! - **Call wrapper**: every outbound call goes through one choke point that
//!   ensures a valid entity token, retries transient failures and unwraps the
//!   response payload
//! - **Retry policies**: strict, standard and bulk presets with exponential
//!   backoff, jitter and server-provided retry-after hints
//! - **Token cache**: expiry-aware entity token caching with single-flight
//!   refresh under concurrent load
//! - **Router**: name-based dispatch with composable middleware (logging,
//!   validation, retry)
//! - **Observability**: structured `tracing` logs with secret redaction
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use playfab_tools::{tools, PlayFabConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PlayFabConfig::from_env()?;
//!     let production = config.production;
//!
//!     let ctx = Arc::new(tools::ToolContext::from_config(config)?);
//!     let router = tools::default_router(ctx);
//!
//!     match router
//!         .dispatch("get_title_data", json!({ "Keys": ["motd"] }), production)
//!         .await
//!     {
//!         Ok(data) => println!("{}", data),
//!         Err(response) => eprintln!("{}: {}", response.code, response.message),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resilience;
pub mod router;
pub mod tools;
pub mod transport;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use auth::{Credential, TokenCache, TokenSource};
pub use client::{add_custom_tags, CallWrapper};
pub use config::{PlayFabConfig, PlayFabConfigBuilder};
pub use errors::{ErrorKind, ErrorResponse, RawFailure, ToolError, ToolResult, UpstreamError};
pub use resilience::{execute_with_retry, PolicyOverride, RetryPolicy};
pub use router::{compose, Handler, Middleware, Route, Router};
pub use transport::{ApiResponse, PlatformClient};
