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

//! ViaCEP postal code lookup.

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{ResultExt, ensure};
use tracing::instrument;

use crate::{
    Result,
    client::{RequestBuilderExt, parse_base_url},
    error::{
        ApiResult, Upstream, UpstreamDecodeSnafu, UpstreamStatusSnafu, UpstreamUnavailableSnafu,
        UpstreamUrlSnafu, ZipcodeNotFoundSnafu,
    },
};

pub const DEFAULT_POSTAL_URL: &str = "http://viacep.com.br";

/// Address registered for a postal code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalityRecord {
    pub cep:         String,
    /// Street
    pub logradouro:  String,
    pub complemento: String,
    /// District
    pub bairro:      String,
    /// City
    pub localidade:  String,
    /// State code
    pub uf:          String,
    pub ibge:        String,
    pub gia:         String,
    pub ddd:         String,
    pub siafi:       String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub erro:        bool,
}

impl LocalityRecord {
    /// ViaCEP answers 200 for unknown codes and marks them with `erro`.
    #[must_use]
    pub fn is_not_found(&self) -> bool { self.erro || self.localidade.trim().is_empty() }
}

/// Accepts `true`, `"true"` and `null`.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(flag)) => flag,
        Some(Flag::Text(text)) => text.eq_ignore_ascii_case("true"),
        None => false,
    })
}

#[derive(Debug, Clone)]
pub struct PostalLookup {
    client:   reqwest::Client,
    base_url: Url,
}

impl PostalLookup {
    /// # Errors
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    /// Resolve `zipcode` to its locality.
    ///
    /// Unknown codes fail with `ZipcodeNotFound`.
    #[instrument(name = "lookup_locality", skip(self), err(Display))]
    pub async fn lookup(&self, zipcode: &str) -> ApiResult<LocalityRecord> {
        let upstream = Upstream::PostalLookup;
        let url = self
            .base_url
            .join(&format!("ws/{zipcode}/json/"))
            .context(UpstreamUrlSnafu { upstream })?;

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
        let record: LocalityRecord =
            serde_json::from_slice(&body).context(UpstreamDecodeSnafu { upstream })?;

        ensure!(!record.is_not_found(), ZipcodeNotFoundSnafu { zipcode });
        Ok(record)
    }
}
