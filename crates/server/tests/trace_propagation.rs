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

//! Trace context crosses every hop. Runs in its own binary because it
//! installs the process-wide logging setup the services run with: `info`
//! filter and no span export.

mod common;

use std::{
    sync::{Mutex, Once, PoisonError},
    time::Duration,
};

use axum::{Router, http::HeaderMap, routing::get};
use common::*;
use reqwest::StatusCode;
use zipweather_common_telemetry::logging::{LoggingOptions, TelemetryGuard, init_global_logging};
use zipweather_server::http::RouteHandler;

const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

static INIT: Once = Once::new();
static GUARD: Mutex<Option<TelemetryGuard>> = Mutex::new(None);

fn init_tracing() {
    INIT.call_once(|| {
        let opts = LoggingOptions {
            level: Some("info".to_string()),
            ..LoggingOptions::default()
        };
        let guard = init_global_logging("trace-propagation", &opts, None);
        assert!(!guard.is_exporting());
        *GUARD.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
    });
}

#[tokio::test]
async fn test_trace_id_survives_both_hops() {
    init_tracing();
    let upstreams = Upstreams::start().await;
    let resolver = start_resolver(&upstreams.resolver_config()).await;
    let gateway = start_gateway(&base_url(&resolver), Duration::from_secs(5)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/city-by-zipcode", base_url(&gateway)))
        .header("traceparent", TRACEPARENT)
        .json(&serde_json::json!({ "cep": SAO_PAULO }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let postal = upstreams.postal_calls.traceparents();
    let weather = upstreams.weather_calls.traceparents();
    assert_eq!(postal.len(), 1);
    assert_eq!(weather.len(), 1);
    assert_eq!(trace_id_of(&postal[0]), TRACE_ID);
    assert_eq!(trace_id_of(&weather[0]), TRACE_ID);
    // Each hop is a new span of the same trace.
    assert_ne!(postal[0], TRACEPARENT);
}

#[tokio::test]
async fn test_gateway_forwards_trace_to_resolver() {
    init_tracing();
    let calls = Recorder::default();
    let state = calls.clone();
    let routes: RouteHandler = Box::new(move |router: Router| {
        let state = state.clone();
        router.route(
            "/city-weather",
            get(move |headers: HeaderMap| {
                let state = state.clone();
                async move {
                    state.record(String::new(), &headers);
                    (StatusCode::UNPROCESSABLE_ENTITY, "can not find zipcode")
                }
            }),
        )
    });
    let resolver = serve(vec![routes]).await;
    let gateway = start_gateway(&base_url(&resolver), Duration::from_secs(5)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/city-by-zipcode", base_url(&gateway)))
        .header("traceparent", TRACEPARENT)
        .json(&serde_json::json!({ "cep": UNKNOWN_FLAGGED }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let forwarded = calls.traceparents();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(trace_id_of(&forwarded[0]), TRACE_ID);
}

#[tokio::test]
async fn test_request_without_parent_starts_a_trace() {
    init_tracing();
    let upstreams = Upstreams::start().await;
    let resolver = start_resolver(&upstreams.resolver_config()).await;

    let response = reqwest::get(format!(
        "{}/city-weather?zipcode={SAO_PAULO}",
        base_url(&resolver)
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let postal = upstreams.postal_calls.traceparents();
    let weather = upstreams.weather_calls.traceparents();
    assert_eq!(postal.len(), 1);
    assert_eq!(trace_id_of(&postal[0]), trace_id_of(&weather[0]));
    assert_ne!(trace_id_of(&postal[0]), TRACE_ID);
}
