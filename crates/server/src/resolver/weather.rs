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

//! WeatherAPI current conditions.

use std::fmt;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tracing::instrument;

use crate::{
    InvalidUrlSnafu, Result,
    client::{RequestBuilderExt, parse_base_url},
    error::{
        ApiResult, Upstream, UpstreamDecodeSnafu, UpstreamStatusSnafu, UpstreamUnavailableSnafu,
    },
};

pub const DEFAULT_WEATHER_URL: &str = "http://api.weatherapi.com/v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    #[serde(default)]
    pub location: WeatherLocation,
    pub current:  CurrentConditions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherLocation {
    pub name:            String,
    pub region:          String,
    pub country:         String,
    pub lat:             f64,
    pub lon:             f64,
    pub tz_id:           String,
    pub localtime_epoch: i64,
    pub localtime:       String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temp_c: f64,
}

#[derive(Clone)]
pub struct WeatherClient {
    client:      reqwest::Client,
    current_url: Url,
    api_key:     String,
}

impl fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherClient")
            .field("current_url", &self.current_url.as_str())
            .finish_non_exhaustive()
    }
}

impl WeatherClient {
    /// # Errors
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn new(client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let current_url = parse_base_url(base_url)?
            .join("current.json")
            .context(InvalidUrlSnafu { url: base_url })?;
        Ok(Self {
            client,
            current_url,
            api_key: api_key.into(),
        })
    }

    /// Current conditions at `city`.
    #[instrument(name = "current_weather", skip(self), err(Display))]
    pub async fn current(&self, city: &str) -> ApiResult<WeatherReading> {
        let upstream = Upstream::WeatherApi;
        let mut url = self.current_url.clone();
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("q", city);

        // `without_url` keeps the api key out of error messages.
        let response = self
            .client
            .get(url)
            .with_trace_context()
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context(UpstreamUnavailableSnafu { upstream })?;

        let status = response.status();
        ensure!(
            status == StatusCode::OK,
            UpstreamStatusSnafu { upstream, status }
        );

        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)
            .context(UpstreamUnavailableSnafu { upstream })?;
        serde_json::from_slice(&body).context(UpstreamDecodeSnafu { upstream })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_current() {
        let reading: WeatherReading = serde_json::from_str(
            r#"{
                "location": {
                    "name": "Sao Paulo",
                    "region": "Sao Paulo",
                    "country": "Brazil",
                    "lat": -23.53,
                    "lon": -46.62,
                    "tz_id": "America/Sao_Paulo",
                    "localtime_epoch": 1718000000,
                    "localtime": "2024-06-10 03:13"
                },
                "current": {"temp_c": 18.4, "temp_f": 65.1, "humidity": 88}
            }"#,
        )
        .unwrap();
        assert_eq!(reading.location.country, "Brazil");
        assert!((reading.current.temp_c - 18.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_location_is_optional_temperature_is_not() {
        let reading: WeatherReading =
            serde_json::from_str(r#"{"current": {"temp_c": -3.5}}"#).unwrap();
        assert_eq!(reading.location, WeatherLocation::default());

        assert!(serde_json::from_str::<WeatherReading>(r#"{"current": {}}"#).is_err());
        assert!(serde_json::from_str::<WeatherReading>(r#"{"location": {}}"#).is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client =
            WeatherClient::new(reqwest::Client::new(), DEFAULT_WEATHER_URL, "secret-key").unwrap();
        assert_eq!(
            client.current_url.as_str(),
            "http://api.weatherapi.com/v1/current.json"
        );
        assert!(!format!("{client:?}").contains("secret-key"));
    }
}
