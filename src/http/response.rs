//! Gateway-generated responses.
//!
//! # Responsibilities
//! - Define the JSON message body the gateway writes itself
//! - Provide the fixed "Api Not Found" response
//! - Map dispatch failures to `500`
//!
//! # Design Decisions
//! - "Not found" is reported in the body (`code: "404"`) with HTTP 200, so
//!   clients always get a parseable gateway message

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde::{Deserialize, Serialize};

pub const API_NOT_FOUND: &str = "Api Not Found";

/// JSON message written by the gateway itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMsg {
    pub http_code: u16,
    pub msg: String,
    pub code: String,
}

impl HttpMsg {
    pub fn new(http_code: StatusCode, msg: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            http_code: http_code.as_u16(),
            msg: msg.into(),
            code: code.into(),
        }
    }

    /// `{"httpCode":200,"msg":"Api Not Found","code":"404"}`.
    pub fn not_found() -> Self {
        Self::new(StatusCode::OK, API_NOT_FOUND, "404")
    }

    pub fn internal_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", "500")
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Render as a response whose status is `http_code`.
    pub fn into_response(self) -> Response<Body> {
        let status = StatusCode::from_u16(self.http_code).unwrap_or(StatusCode::OK);
        let mut response = Response::new(Body::from(self.to_json()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
