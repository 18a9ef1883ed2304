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

use std::{sync::Arc, time::Duration};

use bon::Builder;
use smart_default::SmartDefault;
use snafu::{ResultExt, Whatever};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zipweather_common_telemetry::{self as telemetry, logging::LoggingOptions};
use zipweather_server::{
    ServiceHandler,
    gateway::{self, Gateway, GatewayConfig},
    http::{RestServerConfig, RouteHandler, health_routes, start_rest_server},
    resolver::{self, Resolver, ResolverConfig},
};

/// How long in-flight requests may run after a shutdown signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Which of the two services this process runs.
#[derive(Debug, Clone, derive_more::Display)]
pub enum ServiceKind {
    #[display("gateway")]
    Gateway(GatewayConfig),
    #[display("resolver")]
    Resolver(ResolverConfig),
}

impl Default for ServiceKind {
    fn default() -> Self { Self::Gateway(GatewayConfig::default()) }
}

impl ServiceKind {
    fn route_handlers(&self) -> zipweather_server::Result<Vec<RouteHandler>> {
        let service_routes = match self {
            Self::Gateway(config) => gateway::routes(Arc::new(Gateway::new(config)?)),
            Self::Resolver(config) => resolver::routes(Arc::new(Resolver::new(config)?)),
        };
        let health: RouteHandler = Box::new(health_routes);
        Ok(vec![service_routes, health])
    }
}

/// Represents the main application with lifecycle management
#[derive(SmartDefault)]
pub struct App {
    /// Application configuration
    pub config:             AppConfig,
    /// Cancelled to stop the application as if a signal arrived
    #[default(_code = "CancellationToken::new()")]
    pub cancellation_token: CancellationToken,
}

/// Configuration for the application
#[derive(Debug, Clone, SmartDefault, Builder)]
pub struct AppConfig {
    /// Name reported in logs and on exported spans
    #[default = "zipweather"]
    #[builder(default = "zipweather".to_string(), into)]
    pub service_name: String,
    /// The service to run and its upstream settings
    #[builder(default)]
    pub service:      ServiceKind,
    /// REST server configuration
    #[builder(default)]
    pub http_config:  RestServerConfig,
    /// Logging and span export
    #[builder(default)]
    pub logging:      LoggingOptions,
    /// Time allowed for in-flight requests once shutdown starts
    #[default(_code = "DEFAULT_GRACE_PERIOD")]
    #[builder(default = DEFAULT_GRACE_PERIOD)]
    pub grace_period: Duration,
}

impl AppConfig {
    #[must_use]
    pub fn open(self) -> App {
        App {
            config: self,
            ..Default::default()
        }
    }
}

impl App {
    /// Build the service state and start serving.
    ///
    /// # Errors
    /// Returns an error when an upstream URL is invalid, the HTTP client
    /// cannot be built or the address cannot be bound.
    pub async fn start(&self) -> Result<ServiceHandler, Whatever> {
        let handlers = self
            .config
            .service
            .route_handlers()
            .whatever_context("Failed to set up service")?;

        let mut handler = start_rest_server(self.config.http_config.clone(), handlers)
            .await
            .whatever_context("Failed to start REST server")?;
        handler.wait_for_start().await;

        info!(
            service = %self.config.service,
            addr = %handler.local_addr(),
            "Application started successfully"
        );
        Ok(handler)
    }

    /// Run the application until SIGINT, SIGTERM or cancellation.
    ///
    /// New connections are refused as soon as shutdown starts. In-flight
    /// requests get the configured grace period, then pending spans are
    /// flushed to the collector.
    ///
    /// # Errors
    /// Returns an error if the application fails to start.
    pub async fn run(self) -> Result<(), Whatever> {
        let guard = telemetry::logging::init_global_logging(
            &self.config.service_name,
            &self.config.logging,
            None,
        );
        info!(
            service = %self.config.service,
            exporting = guard.is_exporting(),
            "Starting zipweather"
        );

        let result = self.serve().await;

        // Flushing blocks on the batch processor.
        if let Err(err) = tokio::task::spawn_blocking(move || guard.shutdown()).await {
            error!(error = %err, "telemetry shutdown task failed");
        }
        result
    }

    async fn serve(&self) -> Result<(), Whatever> {
        let handler = self.start().await?;

        shutdown_signal(self.cancellation_token.clone()).await;

        info!(
            grace_period_secs = self.config.grace_period.as_secs(),
            "Shutting down server"
        );
        if !handler.stop_within(self.config.grace_period).await {
            warn!("Some requests did not finish within the grace period");
        }
        info!("Application shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); },
        () = terminate => { info!("Received terminate signal"); },
        () = cancellation_token.cancelled() => { info!("Received shutdown signal"); },
    }
}
