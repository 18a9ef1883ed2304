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

//! # Telemetry
//!
//! Structured logging and distributed tracing for the zipweather services.
//!
//! - **[`logging`]**: stdout/file log layers, the tracer provider and the
//!   [`logging::TelemetryGuard`] that flushes it on shutdown
//! - **[`tracing_context`]**: W3C trace-context injection into outbound
//!   request headers
//!
//! ```rust,no_run
//! use zipweather_common_telemetry::logging::{LoggingOptions, init_global_logging};
//!
//! let opts = LoggingOptions {
//!     enable_otlp_tracing: true,
//!     otlp_endpoint: Some("otel-collector:4317".to_string()),
//!     ..Default::default()
//! };
//! let guard = init_global_logging("zipweather-gateway", &opts, None);
//! tracing::info!("service started");
//! guard.shutdown();
//! ```

pub mod logging;
pub mod tracing_context;
