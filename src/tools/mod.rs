//! Tool handlers exposed through the [`Router`].
//!
//! Each handler validates its arguments, forwards one request through the
//! [`CallWrapper`] and returns the unwrapped `data` payload.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{Credential, EntityTokenSource, TokenCache};
use crate::client::{add_custom_tags, CallWrapper};
use crate::config::PlayFabConfig;
use crate::errors::{RawFailure, ToolError, ToolResult};
use crate::router::middleware::{logging, validation};
use crate::router::{compose, handler, Handler, Route, Router};
use crate::transport::{ApiResponse, PlatformClient};

/// Tool name of the player profile lookup.
pub const GET_PLAYER_PROFILE: &str = "get_player_profile";
/// Tool name of the title data lookup.
pub const GET_TITLE_DATA: &str = "get_title_data";
/// Tool name of the inventory grant.
pub const ADD_INVENTORY_ITEMS: &str = "add_inventory_items";
/// Tool name of the bulk ban.
pub const BAN_USERS: &str = "ban_users";

const MAX_BANS_PER_REQUEST: usize = 100;

/// A remote PlayFab API addressed by path.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Invokes the API at `path` with `request` on behalf of `credential`.
    async fn invoke(
        &self,
        path: &str,
        credential: Credential,
        request: Value,
    ) -> Result<ApiResponse<Value>, RawFailure>;
}

#[async_trait]
impl RemoteApi for PlatformClient {
    async fn invoke(
        &self,
        path: &str,
        credential: Credential,
        request: Value,
    ) -> Result<ApiResponse<Value>, RawFailure> {
        self.post(path, Some(&credential), &request).await
    }
}

type RemoteFuture = BoxFuture<'static, Result<ApiResponse<Value>, RawFailure>>;

/// Shared state of every tool handler.
pub struct ToolContext {
    calls: Arc<CallWrapper>,
    api: Arc<dyn RemoteApi>,
}

impl ToolContext {
    /// Creates a context from its parts.
    pub fn new(calls: Arc<CallWrapper>, api: Arc<dyn RemoteApi>) -> Self {
        Self { calls, api }
    }

    /// Wires the HTTP client, token cache and call wrapper from `config`.
    pub fn from_config(config: PlayFabConfig) -> ToolResult<Self> {
        let attempt_timeout = config.attempt_timeout;
        let client = PlatformClient::new(config)?;
        let tokens = Arc::new(TokenCache::new(Arc::new(EntityTokenSource::new(
            client.clone(),
        ))));
        let calls = CallWrapper::new(tokens).with_attempt_timeout(attempt_timeout);
        Ok(Self::new(Arc::new(calls), Arc::new(client)))
    }

    /// Returns the call wrapper.
    pub fn calls(&self) -> &CallWrapper {
        &self.calls
    }

    /// Remote function bound to `path`, in the shape the call wrapper expects.
    pub fn remote(
        &self,
        path: &'static str,
    ) -> impl Fn(Credential, Value) -> RemoteFuture + Send + Sync + 'static {
        let api = Arc::clone(&self.api);
        move |credential, request| {
            let api = Arc::clone(&api);
            async move { api.invoke(path, credential, request).await }.boxed()
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

/// Fails unless `field` is a non-empty string.
pub fn require_string(args: &Value, field: &str) -> ToolResult<()> {
    match args.get(field).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(ToolError::validation(format!("{} is required", field))),
    }
}

/// Fails unless `field` is a non-empty array.
pub fn require_array(args: &Value, field: &str) -> ToolResult<()> {
    match args.get(field).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err(ToolError::validation(format!(
            "{} must be a non-empty array",
            field
        ))),
    }
}

/// Registers every tool on `router`, each behind logging and validation.
pub fn register_default_tools(router: &Router, ctx: Arc<ToolContext>) {
    router.register_batch([
        (
            GET_PLAYER_PROFILE,
            Route::new(get_player_profile(Arc::clone(&ctx)))
                .with_description("Retrieve a player's profile by PlayFab ID"),
        ),
        (
            GET_TITLE_DATA,
            Route::new(get_title_data(Arc::clone(&ctx)))
                .with_description("Read title-wide key/value data"),
        ),
        (
            ADD_INVENTORY_ITEMS,
            Route::new(add_inventory_items(Arc::clone(&ctx)))
                .with_description("Grant items to a player's inventory"),
        ),
        (
            BAN_USERS,
            Route::new(ban_users(ctx)).with_description("Ban one or more players"),
        ),
    ]);
}

fn guarded<V>(tool: &str, validator: V, inner: Handler) -> Handler
where
    V: Fn(&Value) -> ToolResult<()> + Send + Sync + 'static,
{
    compose([logging(tool), validation(validator)])(inner)
}

/// `get_player_profile { PlayFabId, ProfileConstraints? }`
pub fn get_player_profile(ctx: Arc<ToolContext>) -> Handler {
    let inner = handler(move |args: Value| {
        let ctx = Arc::clone(&ctx);
        async move {
            let mut request = json!({ "PlayFabId": args["PlayFabId"] });
            if let Some(constraints) = args.get("ProfileConstraints") {
                request["ProfileConstraints"] = constraints.clone();
            }

            ctx.calls
                .call_player(ctx.remote("Server/GetPlayerProfile"), request, "GetPlayerProfile")
                .await
        }
    });

    guarded(
        GET_PLAYER_PROFILE,
        |args: &Value| require_string(args, "PlayFabId"),
        inner,
    )
}

/// `get_title_data { Keys? }`
pub fn get_title_data(ctx: Arc<ToolContext>) -> Handler {
    let inner = handler(move |args: Value| {
        let ctx = Arc::clone(&ctx);
        async move {
            let request = match args.get("Keys") {
                Some(keys) => json!({ "Keys": keys }),
                None => json!({}),
            };

            ctx.calls
                .call_admin(ctx.remote("Server/GetTitleData"), request, "GetTitleData")
                .await
        }
    });

    guarded(
        GET_TITLE_DATA,
        |args: &Value| match args.get("Keys") {
            None | Some(Value::Array(_)) => Ok(()),
            Some(_) => Err(ToolError::validation("Keys must be an array of strings")),
        },
        inner,
    )
}

/// `add_inventory_items { TitlePlayerAccountId, ItemId, Amount?, CollectionId?, CustomTags? }`
pub fn add_inventory_items(ctx: Arc<ToolContext>) -> Handler {
    let inner = handler(move |args: Value| {
        let ctx = Arc::clone(&ctx);
        async move {
            let mut request = json!({
                "Entity": {
                    "Id": args["TitlePlayerAccountId"],
                    "Type": "title_player_account",
                },
                "Item": { "Id": args["ItemId"] },
                "Amount": args.get("Amount").cloned().unwrap_or(json!(1)),
            });
            if let Some(collection) = args.get("CollectionId") {
                request["CollectionId"] = collection.clone();
            }
            if let Some(tags) = args.get("CustomTags") {
                request["CustomTags"] = tags.clone();
            }

            ctx.calls
                .call_admin(
                    ctx.remote("Inventory/AddInventoryItems"),
                    add_custom_tags(request),
                    "AddInventoryItems",
                )
                .await
        }
    });

    guarded(
        ADD_INVENTORY_ITEMS,
        |args: &Value| {
            require_string(args, "TitlePlayerAccountId")?;
            require_string(args, "ItemId")?;
            match args.get("Amount") {
                None => Ok(()),
                Some(amount) if amount.as_u64().is_some_and(|n| n > 0) => Ok(()),
                Some(_) => Err(ToolError::validation("Amount must be a positive integer")),
            }
        },
        inner,
    )
}

/// `ban_users { Bans: [{ PlayFabId, Reason?, DurationInHours? }] }`
pub fn ban_users(ctx: Arc<ToolContext>) -> Handler {
    let inner = handler(move |args: Value| {
        let ctx = Arc::clone(&ctx);
        async move {
            let request = json!({ "Bans": args["Bans"] });
            ctx.calls
                .call_bulk(ctx.remote("Server/BanUsers"), request, "BanUsers")
                .await
        }
    });

    guarded(
        BAN_USERS,
        |args: &Value| {
            require_array(args, "Bans")?;
            let bans = args["Bans"].as_array().map(Vec::as_slice).unwrap_or_default();
            if bans.len() > MAX_BANS_PER_REQUEST {
                return Err(ToolError::validation(format!(
                    "At most {} bans per request",
                    MAX_BANS_PER_REQUEST
                )));
            }
            bans.iter().try_for_each(|ban| require_string(ban, "PlayFabId"))
        },
        inner,
    )
}

/// Builds a router with every tool registered.
pub fn default_router(ctx: Arc<ToolContext>) -> Router {
    let router = Router::new();
    register_default_tools(&router, ctx);
    router
}
