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

pub mod client;
pub mod error;
pub mod gateway;
pub mod http;
pub mod model;
pub mod resolver;

use std::{net::SocketAddr, time::Duration};

use snafu::Snafu;
use tokio::{sync::oneshot::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zipweather_error::NetworkError;

/// Errors raised while wiring a service together, before any request is
/// served.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(transparent)]
    Network { source: NetworkError },

    #[snafu(display("Invalid upstream URL {url}"))]
    InvalidUrl {
        url:    String,
        source: url::ParseError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to build HTTP client"))]
    HttpClient {
        source: reqwest::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Handle for managing a running HTTP service.
///
/// This handle provides control over a running service, allowing you to:
/// - Wait for the service to start accepting connections
/// - Signal graceful shutdown
/// - Wait for the service to fully stop, optionally bounded by a grace period
pub struct ServiceHandler {
    /// Join handle for the server task
    join_handle:        JoinHandle<()>,
    /// Token for signalling shutdown
    cancellation_token: CancellationToken,
    /// Receiver for server start notification
    started_rx:         Option<Receiver<()>>,
    /// Address the listener is bound to
    local_addr:         SocketAddr,
}

impl ServiceHandler {
    /// Waits for the server to start accepting connections.
    ///
    /// Returns immediately when the start signal was already consumed or
    /// the server task is gone.
    pub async fn wait_for_start(&mut self) {
        if let Some(started_rx) = self.started_rx.take() {
            let _ = started_rx.await;
        }
    }

    /// The address the server is listening on.
    ///
    /// Useful when binding to port `0`.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Waits for the server to completely stop.
    ///
    /// Use this after calling `shutdown()` to ensure clean termination.
    pub async fn wait_for_stop(self) {
        if let Err(err) = self.join_handle.await {
            warn!(error = %err, "server task did not complete cleanly");
        }
    }

    /// Signals shutdown and waits at most `grace_period` for in-flight
    /// requests to finish.
    ///
    /// Returns `true` when the server drained in time. Otherwise the accept
    /// task is aborted and `false` is returned; connections still open are
    /// dropped when the runtime shuts down.
    pub async fn stop_within(self, grace_period: Duration) -> bool {
        self.shutdown();
        let abort_handle = self.join_handle.abort_handle();
        if tokio::time::timeout(grace_period, self.wait_for_stop())
            .await
            .is_ok()
        {
            info!("server drained within grace period");
            true
        } else {
            warn!(
                grace_period_secs = grace_period.as_secs(),
                "grace period elapsed, aborting remaining connections"
            );
            abort_handle.abort();
            false
        }
    }

    /// Signals the server to begin graceful shutdown.
    ///
    /// The listener is closed right away; connections already accepted keep
    /// being served. Use `wait_for_stop()` or `stop_within()` to wait for
    /// them.
    pub fn shutdown(&self) { self.cancellation_token.cancel(); }
}
