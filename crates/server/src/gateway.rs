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

//! Front service: accepts a postal code, checks it and asks the resolver
//! for the weather.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::header::CONTENT_TYPE,
    routing::post,
};
use bytes::Bytes;
use reqwest::Url;
use smart_default::SmartDefault;
use snafu::{ResultExt, ensure};
use tracing::{field::Empty, instrument};
use validator::Validate;

use crate::{
    InvalidUrlSnafu, Result,
    client::{DEFAULT_UPSTREAM_TIMEOUT, RequestBuilderExt, build_http_client, parse_base_url},
    error::{
        ApiResult, InvalidZipcodeSnafu, MalformedBodySnafu, RelayedSnafu, Upstream,
        UpstreamDecodeSnafu, UpstreamUnavailableSnafu,
    },
    http::RouteHandler,
    model::{TemperatureReport, ZipcodeRequest},
};

pub const CITY_BY_ZIPCODE_PATH: &str = "/city-by-zipcode";

pub const DEFAULT_RESOLVER_URL: &str = "http://localhost:8081";

#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, bon::Builder)]
pub struct GatewayConfig {
    /// Base URL of the resolver service
    #[default(_code = "DEFAULT_RESOLVER_URL.to_string()")]
    #[builder(default = DEFAULT_RESOLVER_URL.to_string(), into)]
    pub resolver_url:     String,
    /// Timeout for each call to the resolver
    #[default(_code = "DEFAULT_UPSTREAM_TIMEOUT")]
    #[builder(default = DEFAULT_UPSTREAM_TIMEOUT)]
    pub upstream_timeout: Duration,
}

/// Shared state of the gateway handlers.
#[derive(Debug)]
pub struct Gateway {
    client:           reqwest::Client,
    city_weather_url: Url,
}

impl Gateway {
    /// # Errors
    /// Returns an error if the resolver URL is not absolute or the HTTP
    /// client cannot be built.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let city_weather_url = parse_base_url(&config.resolver_url)?
            .join("city-weather")
            .context(InvalidUrlSnafu {
                url: &config.resolver_url,
            })?;
        Ok(Self {
            client: build_http_client(config.upstream_timeout)?,
            city_weather_url,
        })
    }

    /// Ask the resolver for the weather at `zipcode`.
    ///
    /// A non-OK answer from the resolver comes back as
    /// [`ApiError::Relayed`](crate::error::ApiError::Relayed) so the caller
    /// sees exactly what the resolver said.
    #[instrument(name = "search_city_by_zipcode", skip(self), err(Display))]
    pub async fn search_city_by_zipcode(&self, zipcode: &str) -> ApiResult<TemperatureReport> {
        let upstream = Upstream::Resolver;
        let mut url = self.city_weather_url.clone();
        url.query_pairs_mut().append_pair("zipcode", zipcode);

        let response = self
            .client
            .get(url)
            .with_trace_context()
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context(UpstreamUnavailableSnafu { upstream })?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .context(UpstreamUnavailableSnafu { upstream })?;

        ensure!(
            status.is_success(),
            RelayedSnafu {
                upstream,
                status,
                content_type,
                body,
            }
        );

        serde_json::from_slice(&body).context(UpstreamDecodeSnafu { upstream })
    }
}

/// `POST /city-by-zipcode`
#[instrument(name = "city_by_zipcode", skip_all, fields(zipcode = Empty), err(Display))]
async fn city_by_zipcode(
    State(gateway): State<Arc<Gateway>>,
    body: Bytes,
) -> ApiResult<Json<TemperatureReport>> {
    let request: ZipcodeRequest = serde_json::from_slice(&body).context(MalformedBodySnafu)?;
    tracing::Span::current().record("zipcode", request.cep.as_str());
    ensure!(
        request.validate().is_ok(),
        InvalidZipcodeSnafu {
            zipcode: &request.cep,
        }
    );

    let report = gateway.search_city_by_zipcode(&request.cep).await?;
    Ok(Json(report))
}

/// Routes served by the gateway.
#[must_use]
pub fn routes(gateway: Arc<Gateway>) -> RouteHandler {
    Box::new(move |router: Router| {
        router.route(
            CITY_BY_ZIPCODE_PATH,
            post(city_by_zipcode).with_state(gateway.clone()),
        )
    })
}
