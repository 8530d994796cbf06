//! Per-request processing context.
//!
//! # Responsibilities
//! - Hold the inbound request and matched route (read-only)
//! - Carry the outbound request being built by request-phase units
//! - Carry the response state mutated by response-phase units
//! - Expose control flags and cross-unit scratch data
//!
//! # Design Decisions
//! - One context per request, owned by the engine and lent to units by `&mut`
//! - A terminal response, once set, wins over the buffered status/headers/body
//! - Scratch data uses `http::Extensions` (typed, no string keys)

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Extensions, HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use bytes::Bytes;

use crate::http::response::error_response;
use crate::routing::CompiledRoute;

/// The request as the client sent it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
}

impl InboundRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }
}

/// Outbound request under construction.
#[derive(Debug, Clone, Default)]
pub struct UpstreamDraft {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub params: Vec<(String, String)>,
    pub body: Bytes,
}

/// Response being assembled.
#[derive(Default)]
pub struct ResponseState {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Fully formed response (error envelope or streamed passthrough).
    pub terminal: Option<Response<Body>>,
}

impl fmt::Debug for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseState")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("terminal", &self.terminal.as_ref().map(|r| r.status()))
            .finish()
    }
}

/// Mutable record threaded through every unit of one request.
#[derive(Debug)]
pub struct ProcessingContext {
    inbound: InboundRequest,
    route: Arc<CompiledRoute>,

    pub upstream: UpstreamDraft,
    pub response: ResponseState,

    /// Bypass the upstream call.
    pub skip_upstream: bool,
    /// Bypass body-mutating units.
    pub skip_response_processing: bool,

    pub request_id: String,
    pub started_at: Instant,
    pub upstream_latency: Option<Duration>,
    pub extensions: Extensions,
}

impl ProcessingContext {
    pub fn new(inbound: InboundRequest, route: Arc<CompiledRoute>) -> Self {
        let upstream = UpstreamDraft {
            method: inbound.method.clone(),
            ..UpstreamDraft::default()
        };
        Self {
            inbound,
            route,
            upstream,
            response: ResponseState::default(),
            skip_upstream: false,
            skip_response_processing: false,
            request_id: String::new(),
            started_at: Instant::now(),
            upstream_latency: None,
            extensions: Extensions::new(),
        }
    }

    pub fn inbound(&self) -> &InboundRequest {
        &self.inbound
    }

    pub fn route(&self) -> &CompiledRoute {
        &self.route
    }

    pub fn has_terminal(&self) -> bool {
        self.response.terminal.is_some()
    }

    /// Replace the outcome with the standard error envelope.
    pub fn respond_error(&mut self, status: StatusCode, message: &str) {
        let response = error_response(status, message, &self.request_id, self.inbound.path());
        self.response.terminal = Some(response);
    }

    /// Status the client will see.
    pub fn final_status(&self) -> StatusCode {
        match &self.response.terminal {
            Some(response) => response.status(),
            None => self.response.status.unwrap_or(StatusCode::OK),
        }
    }

    /// Consume the context into the response sent to the client.
    pub fn into_response(self) -> Response<Body> {
        let ResponseState {
            status,
            mut headers,
            body,
            terminal,
        } = self.response;

        if let Some(response) = terminal {
            return response;
        }

        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = headers;
        response
    }
}

/// Context for a GET on `path`, matched against `route`.
#[cfg(test)]
pub(crate) fn test_context(route: crate::config::RouteConfig, path: &str) -> ProcessingContext {
    let route = CompiledRoute::compile(route).expect("route compiles");
    let inbound = InboundRequest {
        method: Method::GET,
        uri: path.parse().expect("valid uri"),
        headers: HeaderMap::new(),
        body: Bytes::new(),
        client_addr: Some(SocketAddr::from(([127, 0, 0, 1], 40000))),
    };
    let mut ctx = ProcessingContext::new(inbound, Arc::new(route));
    ctx.request_id = "test-request".to_string();
    ctx
}
