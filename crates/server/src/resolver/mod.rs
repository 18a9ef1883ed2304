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

//! Back service: turns a postal code into a city and its current
//! temperature.
//!
//! The two upstream calls are sequential. The weather API is only asked
//! once the postal lookup produced a city.

pub mod postal;
pub mod weather;

use std::{fmt, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::get,
};
use serde::Deserialize;
use smart_default::SmartDefault;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{field::Empty, instrument};

use self::{
    postal::{DEFAULT_POSTAL_URL, PostalLookup},
    weather::{DEFAULT_WEATHER_URL, WeatherClient},
};
use crate::{
    Result,
    client::{DEFAULT_UPSTREAM_TIMEOUT, build_http_client},
    error::{ApiResult, InvalidZipcodeSnafu, MalformedQuerySnafu, MissingZipcodeSnafu},
    http::RouteHandler,
    model::{TemperatureReport, is_valid_zipcode},
};

pub const CITY_WEATHER_PATH: &str = "/city-weather";

#[derive(Clone, PartialEq, Eq, SmartDefault, bon::Builder)]
pub struct ResolverConfig {
    /// Base URL of the postal lookup API
    #[default(_code = "DEFAULT_POSTAL_URL.to_string()")]
    #[builder(default = DEFAULT_POSTAL_URL.to_string(), into)]
    pub postal_url:       String,
    /// Base URL of the weather API
    #[default(_code = "DEFAULT_WEATHER_URL.to_string()")]
    #[builder(default = DEFAULT_WEATHER_URL.to_string(), into)]
    pub weather_url:      String,
    /// Key sent to the weather API
    #[builder(default, into)]
    pub weather_api_key:  String,
    /// Timeout for each upstream call
    #[default(_code = "DEFAULT_UPSTREAM_TIMEOUT")]
    #[builder(default = DEFAULT_UPSTREAM_TIMEOUT)]
    pub upstream_timeout: Duration,
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("postal_url", &self.postal_url)
            .field("weather_url", &self.weather_url)
            .field("weather_api_key", &"<redacted>")
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

/// Shared state of the resolver handlers.
#[derive(Debug)]
pub struct Resolver {
    postal:  PostalLookup,
    weather: WeatherClient,
}

impl Resolver {
    /// # Errors
    /// Returns an error if an upstream URL is not absolute or the HTTP
    /// client cannot be built.
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let client = build_http_client(config.upstream_timeout)?;
        Ok(Self {
            postal:  PostalLookup::new(client.clone(), &config.postal_url)?,
            weather: WeatherClient::new(client, &config.weather_url, &config.weather_api_key)?,
        })
    }

    /// Look up the city of `zipcode` and its current temperature.
    ///
    /// # Errors
    /// Fails with `InvalidZipcode` before any upstream call when `zipcode`
    /// is not eight digits.
    pub async fn city_weather(&self, zipcode: &str) -> ApiResult<TemperatureReport> {
        ensure!(is_valid_zipcode(zipcode), InvalidZipcodeSnafu { zipcode });

        let locality = self.postal.lookup(zipcode).await?;
        let reading = self.weather.current(&locality.localidade).await?;
        Ok(TemperatureReport::from_celsius(
            locality.localidade,
            reading.current.temp_c,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct CityWeatherQuery {
    zipcode: Option<String>,
}

/// `GET /city-weather?zipcode=`
///
/// Query string rejections are answered here so they get the JSON error
/// body and land on the span.
#[instrument(name = "city_weather", skip_all, fields(zipcode = Empty), err(Display))]
async fn city_weather(
    State(resolver): State<Arc<Resolver>>,
    query: std::result::Result<Query<CityWeatherQuery>, QueryRejection>,
) -> ApiResult<Json<TemperatureReport>> {
    let Query(query) = query.context(MalformedQuerySnafu)?;
    let zipcode = query
        .zipcode
        .filter(|zipcode| !zipcode.is_empty())
        .context(MissingZipcodeSnafu)?;
    tracing::Span::current().record("zipcode", zipcode.as_str());

    let report = resolver.city_weather(&zipcode).await?;
    Ok(Json(report))
}

/// Routes served by the resolver.
#[must_use]
pub fn routes(resolver: Arc<Resolver>) -> RouteHandler {
    Box::new(move |router: Router| {
        router.route(
            CITY_WEATHER_PATH,
            get(city_weather).with_state(resolver.clone()),
        )
    })
}
