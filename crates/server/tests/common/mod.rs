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

//! Stub upstreams served by real axum servers on loopback.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use zipweather_server::{
    ServiceHandler,
    gateway::{self, Gateway, GatewayConfig},
    http::{RestServerConfig, RouteHandler, start_rest_server},
    resolver::{self, Resolver, ResolverConfig},
};

pub const WEATHER_API_KEY: &str = "test-key";

/// Known postal codes of the stub lookup service.
pub const SAO_PAULO: &str = "01001000";
pub const UNKNOWN_FLAGGED: &str = "99999999";
pub const UNKNOWN_FLAGGED_BOOL: &str = "88888888";
pub const UNKNOWN_EMPTY_CITY: &str = "22222222";
pub const LOOKUP_DOWN: &str = "50000000";
pub const LOOKUP_GARBAGE: &str = "60000000";

fn loopback() -> RestServerConfig {
    RestServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..RestServerConfig::default()
    }
}

pub async fn serve(handlers: Vec<RouteHandler>) -> ServiceHandler {
    let mut handler = start_rest_server(loopback(), handlers).await.unwrap();
    handler.wait_for_start().await;
    handler
}

pub fn base_url(handler: &ServiceHandler) -> String { format!("http://{}", handler.local_addr()) }

/// Parse the trace id out of a `traceparent` header value.
pub fn trace_id_of(traceparent: &str) -> String {
    traceparent.split('-').nth(1).unwrap().to_string()
}

#[derive(Default, Clone)]
pub struct Recorder {
    pub hits:         Arc<AtomicUsize>,
    pub queries:      Arc<Mutex<Vec<String>>>,
    pub traceparents: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn record(&self, query: String, headers: &HeaderMap) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query);
        if let Some(value) = headers.get("traceparent") {
            self.traceparents
                .lock()
                .unwrap()
                .push(value.to_str().unwrap().to_string());
        }
    }

    pub fn hits(&self) -> usize { self.hits.load(Ordering::SeqCst) }

    pub fn queries(&self) -> Vec<String> { self.queries.lock().unwrap().clone() }

    pub fn traceparents(&self) -> Vec<String> { self.traceparents.lock().unwrap().clone() }
}

fn postal_response(cep: &str) -> Response {
    match cep {
        SAO_PAULO => Json(json!({
            "cep": "01001-000",
            "logradouro": "Praça da Sé",
            "bairro": "Sé",
            "localidade": "São Paulo",
            "uf": "SP",
            "ibge": "3550308",
            "ddd": "11",
            "siafi": "7107"
        }))
        .into_response(),
        UNKNOWN_FLAGGED => Json(json!({ "erro": "true" })).into_response(),
        UNKNOWN_FLAGGED_BOOL => Json(json!({ "erro": true })).into_response(),
        UNKNOWN_EMPTY_CITY => Json(json!({ "cep": "22222-222", "localidade": "" })).into_response(),
        LOOKUP_DOWN => (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response(),
        LOOKUP_GARBAGE => "<html>not json</html>".into_response(),
        _ => (StatusCode::BAD_REQUEST, "bad request").into_response(),
    }
}

/// A ViaCEP lookalike serving `/ws/{cep}/json/`.
pub async fn start_postal_stub() -> (ServiceHandler, Recorder) {
    let recorder = Recorder::default();
    let state = recorder.clone();
    let routes: RouteHandler = Box::new(move |router: Router| {
        let state = state.clone();
        router.route(
            "/ws/{cep}/json/",
            get(move |Path(cep): Path<String>, headers: HeaderMap| {
                let state = state.clone();
                async move {
                    state.record(cep.clone(), &headers);
                    postal_response(&cep)
                }
            }),
        )
    });
    (serve(vec![routes]).await, recorder)
}

/// A WeatherAPI lookalike serving `/v1/current.json`. Every city is 25°C.
pub async fn start_weather_stub() -> (ServiceHandler, Recorder) {
    let recorder = Recorder::default();
    let state = recorder.clone();
    let routes: RouteHandler = Box::new(move |router: Router| {
        let state = state.clone();
        router.route(
            "/v1/current.json",
            get(
                move |Query(params): Query<HashMap<String, String>>, headers: HeaderMap| {
                    let state = state.clone();
                    async move {
                        let city = params.get("q").cloned().unwrap_or_default();
                        state.record(city.clone(), &headers);
                        if params.get("key").map(String::as_str) != Some(WEATHER_API_KEY) {
                            return (
                                StatusCode::UNAUTHORIZED,
                                Json(json!({
                                    "error": { "code": 2006, "message": "API key is invalid." }
                                })),
                            )
                                .into_response();
                        }
                        Json(json!({
                            "location": { "name": city, "country": "Brazil" },
                            "current": { "temp_c": 25.0 }
                        }))
                        .into_response()
                    }
                },
            ),
        )
    });
    (serve(vec![routes]).await, recorder)
}

pub struct Upstreams {
    pub postal:        ServiceHandler,
    pub postal_calls:  Recorder,
    pub weather:       ServiceHandler,
    pub weather_calls: Recorder,
}

impl Upstreams {
    pub async fn start() -> Self {
        let (postal, postal_calls) = start_postal_stub().await;
        let (weather, weather_calls) = start_weather_stub().await;
        Self {
            postal,
            postal_calls,
            weather,
            weather_calls,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::builder()
            .postal_url(base_url(&self.postal))
            .weather_url(format!("{}/v1", base_url(&self.weather)))
            .weather_api_key(WEATHER_API_KEY)
            .build()
    }
}

pub async fn start_resolver(config: &ResolverConfig) -> ServiceHandler {
    let resolver = Arc::new(Resolver::new(config).unwrap());
    serve(vec![resolver::routes(resolver)]).await
}

pub async fn start_gateway(resolver_url: &str, timeout: Duration) -> ServiceHandler {
    let config = GatewayConfig::builder()
        .resolver_url(resolver_url)
        .upstream_timeout(timeout)
        .build();
    let gateway = Arc::new(Gateway::new(&config).unwrap());
    serve(vec![gateway::routes(gateway)]).await
}
