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

use std::{any::Any, error::Error as StdError};

use http::StatusCode as HttpStatusCode;
use serde::Serialize;
use snafu::Snafu;
use strum::EnumProperty;

/// Transport-independent classification of a failure.
///
/// Every error surfaced to a client carries one of these. The HTTP status is
/// attached as a strum property so the mapping lives next to the variant.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::EnumProperty,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusCode {
    #[strum(props(http_status = "400"))]
    InvalidArgument,
    #[strum(props(http_status = "422"))]
    UnprocessableEntity,
    #[strum(props(http_status = "500"))]
    Upstream,
    #[strum(props(http_status = "500"))]
    Internal,
    #[strum(props(http_status = "500"))]
    Unknown,
}

impl StatusCode {
    #[must_use]
    pub fn http_status(self) -> HttpStatusCode {
        self.get_str("http_status")
            .and_then(|value| value.parse::<u16>().ok())
            .and_then(|value| HttpStatusCode::from_u16(value).ok())
            .unwrap_or(HttpStatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub trait StackError: StdError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);

    fn next(&self) -> Option<&dyn StackError>;

    fn last(&self) -> &dyn StackError
    where
        Self: Sized,
    {
        let Some(mut result) = self.next() else {
            return self;
        };
        while let Some(err) = result.next() {
            result = err;
        }
        result
    }
}

pub trait ErrorExt: StackError {
    fn status_code(&self) -> StatusCode { StatusCode::Unknown }

    fn as_any(&self) -> &dyn Any;

    /// The message rendered into an error response.
    ///
    /// Client errors include their root cause. Upstream failures only name
    /// the failing step. Internal errors are reduced to a fixed string.
    fn output_msg(&self) -> String
    where
        Self: Sized,
    {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal => "internal error".to_string(),
            StatusCode::Upstream => format!("{}", self.last()),
            _ => {
                let error = self.last();
                if let Some(external_error) = error.source() {
                    let mut root = external_error;
                    while let Some(source) = root.source() {
                        root = source;
                    }
                    format!("{error}: {root}")
                } else {
                    format!("{error}")
                }
            }
        }
    }
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum NetworkError {
    #[snafu(display("Failed to bind {addr}"))]
    ConnectionError {
        addr:   String,
        #[snafu(source)]
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to parse address {addr}"))]
    ParseAddressError {
        addr:   String,
        #[snafu(source)]
        source: std::net::AddrParseError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

#[cfg(test)]
mod tests {
    use snafu::ResultExt;

    use super::*;

    #[derive(Debug, Snafu)]
    enum ProbeError {
        #[snafu(display("bad input"))]
        BadInput { source: std::num::ParseIntError },
        #[snafu(display("lookup failed"))]
        Lookup { source: std::io::Error },
        #[snafu(display("secret {detail}"))]
        Broken { detail: String },
    }

    impl StackError for ProbeError {
        fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
            buf.push(format!("{layer}: {self}"));
        }

        fn next(&self) -> Option<&dyn StackError> { None }
    }

    impl ErrorExt for ProbeError {
        fn status_code(&self) -> StatusCode {
            match self {
                Self::BadInput { .. } => StatusCode::InvalidArgument,
                Self::Lookup { .. } => StatusCode::Upstream,
                Self::Broken { .. } => StatusCode::Internal,
            }
        }

        fn as_any(&self) -> &dyn Any { self as _ }
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(StatusCode::InvalidArgument.http_status(), 400);
        assert_eq!(StatusCode::UnprocessableEntity.http_status(), 422);
        assert_eq!(StatusCode::Upstream.http_status(), 500);
        assert_eq!(StatusCode::Internal.http_status(), 500);
        assert_eq!(StatusCode::Unknown.http_status(), 500);
    }

    #[test]
    fn test_status_code_names() {
        assert_eq!(StatusCode::UnprocessableEntity.to_string(), "unprocessable_entity");
        assert_eq!(
            "invalid_argument".parse::<StatusCode>().unwrap(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            serde_json::to_string(&StatusCode::Upstream).unwrap(),
            "\"upstream\""
        );
    }

    #[test]
    fn test_output_msg_by_visibility() {
        let client = "x".parse::<u32>().context(BadInputSnafu).unwrap_err();
        assert!(client.output_msg().starts_with("bad input: "));
        assert!(client.output_msg().contains("invalid digit"));

        let upstream = Err::<(), _>(std::io::Error::other("key=abc"))
            .context(LookupSnafu)
            .unwrap_err();
        assert_eq!(upstream.output_msg(), "lookup failed");

        let internal = ProbeError::Broken {
            detail: "leak".to_string(),
        };
        assert_eq!(internal.output_msg(), "internal error");
    }
}
