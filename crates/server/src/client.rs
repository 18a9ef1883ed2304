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

//! Outbound HTTP plumbing shared by the gateway and the resolver.

use std::time::Duration;

use reqwest::{RequestBuilder, Url, header::HeaderMap};
use snafu::ResultExt;
use zipweather_common_telemetry::tracing_context::inject_current_context;

use crate::{HttpClientSnafu, InvalidUrlSnafu, Result};

/// Default timeout for a single outbound call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the pooled client a service uses for all of its upstream calls.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .context(HttpClientSnafu)
}

/// Parse an upstream base URL so relative paths can be joined onto it.
///
/// A trailing `/` is added when missing, otherwise `join` would replace the
/// last path segment (`http://host/v1` + `current.json` would lose `v1`).
///
/// # Errors
/// Returns an error if `raw` is not an absolute URL.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).context(InvalidUrlSnafu { url: raw })
}

/// Propagates the caller's trace context on outbound requests.
pub trait RequestBuilderExt {
    /// Add `traceparent`/`tracestate` headers for the current span.
    #[must_use]
    fn with_trace_context(self) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn with_trace_context(self) -> Self {
        let mut headers = HeaderMap::new();
        inject_current_context(&mut headers);
        if headers.is_empty() {
            self
        } else {
            self.headers(headers)
        }
    }
}
