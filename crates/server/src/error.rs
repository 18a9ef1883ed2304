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

use std::any::Any;

use axum::{
    Json,
    extract::rejection::QueryRejection,
    http::{HeaderValue, StatusCode as HttpStatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Serialize;
use snafu::Snafu;
use strum::EnumProperty;
use zipweather_error::{ErrorExt, StackError, StatusCode};

/// The service on the other end of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Upstream {
    #[strum(serialize = "resolver")]
    Resolver,
    #[strum(serialize = "postal lookup")]
    PostalLookup,
    #[strum(serialize = "weather api")]
    WeatherApi,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code:    StatusCode,
    pub message: String,
}

#[derive(Debug, Snafu, strum_macros::EnumProperty)]
#[snafu(visibility(pub))]
pub enum ApiError {
    #[snafu(display("malformed request body"))]
    #[strum(props(status_code = "invalid_argument"))]
    MalformedBody { source: serde_json::Error },

    #[snafu(display("malformed query string"))]
    #[strum(props(status_code = "invalid_argument"))]
    MalformedQuery { source: QueryRejection },

    #[snafu(display("missing 'zipcode' parameter"))]
    #[strum(props(status_code = "invalid_argument"))]
    MissingZipcode,

    #[snafu(display("invalid zipcode"))]
    #[strum(props(status_code = "unprocessable_entity"))]
    InvalidZipcode { zipcode: String },

    #[snafu(display("can not find zipcode"))]
    #[strum(props(status_code = "unprocessable_entity"))]
    ZipcodeNotFound { zipcode: String },

    #[snafu(display("{upstream} is unavailable"))]
    #[strum(props(status_code = "upstream"))]
    UpstreamUnavailable {
        upstream: Upstream,
        source:   reqwest::Error,
    },

    #[snafu(display("{upstream} responded with {status}"))]
    #[strum(props(status_code = "upstream"))]
    UpstreamStatus {
        upstream: Upstream,
        status:   HttpStatusCode,
    },

    #[snafu(display("{upstream} returned an undecodable body"))]
    #[strum(props(status_code = "upstream"))]
    UpstreamDecode {
        upstream: Upstream,
        source:   serde_json::Error,
    },

    #[snafu(display("Invalid {upstream} url"))]
    #[strum(props(status_code = "internal"))]
    UpstreamUrl {
        upstream: Upstream,
        source:   url::ParseError,
    },

    /// A non-OK answer from an upstream that is passed through untouched.
    #[snafu(display("{upstream} answered {status}"))]
    #[strum(props(status_code = "upstream"))]
    Relayed {
        upstream:     Upstream,
        status:       HttpStatusCode,
        content_type: Option<HeaderValue>,
        body:         Bytes,
    },
}

impl ApiError {
    /// The HTTP status this error is answered with.
    #[must_use]
    pub fn http_status(&self) -> HttpStatusCode {
        match self {
            Self::Relayed { status, .. } => *status,
            _ => self.status_code().http_status(),
        }
    }
}

impl ErrorExt for ApiError {
    fn status_code(&self) -> StatusCode {
        self.get_str("status_code")
            .and_then(|value| value.parse().ok())
            .unwrap_or(StatusCode::Unknown)
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

impl StackError for ApiError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if let Self::Relayed {
            status,
            content_type,
            body,
            ..
        } = self
        {
            let mut response = (status, body).into_response();
            let headers = response.headers_mut();
            headers.remove(CONTENT_TYPE);
            if let Some(content_type) = content_type {
                headers.insert(CONTENT_TYPE, content_type);
            }
            return response;
        }

        let body = Json(ErrorBody {
            code:    self.status_code(),
            message: self.output_msg(),
        });
        (self.http_status(), body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
