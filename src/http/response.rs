//! Client-visible error responses.
//!
//! # Responsibilities
//! - Render the single error envelope `{error, request_id, path}`
//! - Echo the request id as `x-request-id`
//!
//! # Design Decisions
//! - Messages are fixed status phrases; internals never reach the client

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::http::request::X_REQUEST_ID;

/// Error body shared by every failure the gateway reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub request_id: String,
    pub path: String,
}

/// Build an error response carrying the standard envelope.
pub fn error_response(status: StatusCode, message: &str, request_id: &str, path: &str) -> Response<Body> {
    let envelope = ErrorEnvelope {
        error: message.to_string(),
        request_id: request_id.to_string(),
        path: path.to_string(),
    };
    // Serializing three strings cannot fail
    let body = serde_json::to_vec(&envelope).unwrap_or_default();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(&X_REQUEST_ID, value);
    }
    response
}
