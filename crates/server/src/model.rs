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

//! Payloads exchanged between the client, the gateway and the resolver.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Number of digits in a Brazilian postal code (CEP).
pub const ZIPCODE_LEN: usize = 8;

/// Body accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ZipcodeRequest {
    #[validate(custom(function = "validate_zipcode"))]
    pub cep: String,
}

/// Whether `zipcode` is exactly eight ASCII digits.
#[must_use]
pub fn is_valid_zipcode(zipcode: &str) -> bool {
    zipcode.len() == ZIPCODE_LEN && zipcode.bytes().all(|b| b.is_ascii_digit())
}

fn validate_zipcode(zipcode: &str) -> Result<(), ValidationError> {
    if is_valid_zipcode(zipcode) {
        Ok(())
    } else {
        Err(ValidationError::new("zipcode").with_message("invalid zipcode".into()))
    }
}

/// Current temperature of a city in three scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReport {
    #[serde(rename = "temp_C")]
    pub celsius:    f64,
    #[serde(rename = "temp_F")]
    pub fahrenheit: f64,
    #[serde(rename = "temp_K")]
    pub kelvin:     f64,
    pub city:       String,
}

impl TemperatureReport {
    #[must_use]
    pub fn from_celsius(city: impl Into<String>, celsius: f64) -> Self {
        Self {
            celsius,
            fahrenheit: celsius_to_fahrenheit(celsius),
            kelvin: celsius_to_kelvin(celsius),
            city: city.into(),
        }
    }
}

#[must_use]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 { celsius * 9.0 / 5.0 + 32.0 }

#[must_use]
pub fn celsius_to_kelvin(celsius: f64) -> f64 { celsius + 273.15 }
