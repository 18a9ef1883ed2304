// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::{
    Router, extract::DefaultBodyLimit, http::StatusCode, response::IntoResponse, routing::get,
};
use axum_tracing_opentelemetry::middleware::{OtelAxumLayer, OtelInResponseLayer};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use zipweather_error::{ConnectionSnafu, ParseAddressSnafu};

use super::{Result, ServiceHandler};

/// Default maximum HTTP request body size (64 KiB). Requests here carry a
/// single postal code.
pub const DEFAULT_MAX_HTTP_BODY_SIZE: usize = 64 * 1024;

/// A function that registers routes on the server router.
pub type RouteHandler = Box<dyn Fn(Router) -> Router + Send + Sync>;

/// Configuration options for a REST server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
pub struct RestServerConfig {
    /// The address to bind the REST server
    #[default = "127.0.0.1:8080"]
    #[builder(default = "127.0.0.1:8080".to_string())]
    pub bind_address:  String,
    /// Maximum HTTP request body size in bytes
    #[default(_code = "DEFAULT_MAX_HTTP_BODY_SIZE")]
    #[builder(default = DEFAULT_MAX_HTTP_BODY_SIZE)]
    pub max_body_size: usize,
    /// Whether to enable CORS
    #[default = true]
    #[builder(default = true)]
    pub enable_cors:   bool,
}

/// Starts the REST server and returns a handle for managing its lifecycle.
///
/// This method:
/// 1. Registers all provided route handlers plus the health endpoints
/// 2. Wraps them with trace-context extraction, body limits and CORS
/// 3. Binds the configured address
/// 4. Spawns the server in a background task
/// 5. Returns a handle for lifecycle management
///
/// The listener is bound before this function returns, so requests sent
/// right after it are queued rather than refused.
///
/// # Errors
/// Returns an error if the bind address cannot be parsed or bound.
///
/// # Example
///
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use zipweather_server::http::{RestServerConfig, RouteHandler, start_rest_server};
///
/// # async fn run() -> zipweather_server::Result<()> {
/// let hello: RouteHandler =
///     Box::new(|router: Router| router.route("/hello", get(|| async { "Hello" })));
/// let handle = start_rest_server(RestServerConfig::default(), vec![hello]).await?;
/// handle.shutdown();
/// handle.wait_for_stop().await;
/// # Ok(())
/// # }
/// ```
pub async fn start_rest_server<F>(
    config: RestServerConfig,
    route_handlers: Vec<F>,
) -> Result<ServiceHandler>
where
    F: Fn(Router) -> Router + Send + Sync + 'static,
{
    let bind_addr = config
        .bind_address
        .parse::<std::net::SocketAddr>()
        .context(ParseAddressSnafu {
            addr: config.bind_address.clone(),
        })?;

    let mut router = Router::new().route("/health", get(health_check));
    for handler in &route_handlers {
        info!("Registering REST route handler");
        router = handler(router);
    }

    // Layers only wrap routes registered before them.
    router = router
        .layer(OtelInResponseLayer::default())
        .layer(OtelAxumLayer::default())
        .layer(DefaultBodyLimit::max(config.max_body_size));

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context(ConnectionSnafu {
            addr: config.bind_address.clone(),
        })?;
    let local_addr = listener.local_addr().context(ConnectionSnafu {
        addr: config.bind_address.clone(),
    })?;

    let cancellation_token = CancellationToken::new();
    let (join_handle, started_rx) = {
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let cancellation_token_clone = cancellation_token.clone();
        let join_handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    info!("REST server (on {}) starting", local_addr);
                    let _ = started_tx.send(());
                    info!("REST server (on {}) started", local_addr);
                    cancellation_token_clone.cancelled().await;
                    info!("REST server (on {}) received shutdown signal", local_addr);
                })
                .await;

            info!(
                "REST server (on {}) task completed: {:?}",
                local_addr, result
            );
        });
        (join_handle, started_rx)
    };

    Ok(ServiceHandler {
        join_handle,
        cancellation_token,
        started_rx: Some(started_rx),
        local_addr,
    })
}

/// Health check endpoint for the REST server
async fn health_check() -> impl IntoResponse { (StatusCode::OK, "OK") }

/// Health check handler that returns detailed health information
async fn api_health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "zipweather",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Add the detailed health endpoint to the router.
pub fn health_routes(router: Router) -> Router {
    router.route("/api/v1/health", get(api_health_handler))
}
