//! Upstream HTTP client capability.
//!
//! # Data Flow
//! ```text
//! Forwarder unit
//!     → UpstreamRequest (method, url, headers, params, body, timeouts)
//!     → UpstreamClient::send
//!     → UpstreamResponse (status, headers, lazy body stream)
//! ```
//!
//! # Design Decisions
//! - The pipeline only sees this trait; `client.rs` backs it with reqwest
//! - The body is always a lazy stream: the caller decides to buffer or pass it through
//! - Connect failure, deadline and other transport errors are distinct variants
//! - Dropping the body stream releases the connection slot

pub mod client;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::config::TimeoutConfig;

pub use client::HttpUpstream;

/// Lazily consumed upstream body.
pub type BodyStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Error surfaced by an upstream call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("could not connect to upstream: {0}")]
    Connect(String),

    #[error("upstream deadline exceeded")]
    Timeout,

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("failed to build upstream client: {0}")]
    Build(String),
}

impl UpstreamError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Timeout => "timeout",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::Build(_) => "build",
        }
    }
}

/// Per-call deadlines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpstreamTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl From<&TimeoutConfig> for UpstreamTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: config.connect(),
            read: config.read(),
            write: config.write(),
        }
    }
}

/// Fully built outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub params: Vec<(String, String)>,
    pub body: Bytes,
    pub timeouts: UpstreamTimeouts,
}

/// Upstream response head plus a lazy body.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl UpstreamResponse {
    /// Response whose body is already in memory.
    pub fn buffered(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Capability to issue one HTTP request upstream.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}
