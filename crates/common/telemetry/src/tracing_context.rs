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

//! # Distributed Tracing Context
//!
//! Carries W3C trace context across the HTTP hop between services. Incoming
//! requests are handled by the server middleware; this module covers the
//! outbound side.

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Injector, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use smart_default::SmartDefault;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// W3C Trace Context header carrying the trace and parent span ids.
pub const TRACEPARENT: &str = "traceparent";

/// Distributed tracing context for propagating trace information across
/// services.
#[derive(Debug, Clone, SmartDefault, derive_more::From)]
pub struct TracingContext(
    #[default(_code = "opentelemetry::Context::new()")] opentelemetry::Context,
);

type Propagator = TraceContextPropagator;

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}

impl TracingContext {
    /// Create context from a specific span.
    #[must_use]
    pub fn from_span(span: &tracing::Span) -> Self { Self(span.context()) }

    /// Create context from the current active span.
    #[must_use]
    pub fn from_current_span() -> Self { Self::from_span(&tracing::Span::current()) }

    /// Write `traceparent`/`tracestate` for this context into `headers`.
    ///
    /// An empty or invalid context writes nothing.
    pub fn inject_into(&self, headers: &mut HeaderMap) {
        Propagator::new().inject_context(&self.0, &mut HeaderInjector(headers));
    }
}

/// Inject the current span's trace context into outbound request headers.
pub fn inject_current_context(headers: &mut HeaderMap) {
    TracingContext::from_current_span().inject_into(headers);
}
