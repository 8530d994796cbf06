//! The upstream call.
//!
//! # Responsibilities
//! - Send the request built by earlier units through the shared client
//! - Map connect / transport failures to 502 and deadlines to 504
//! - Decide between buffering the body (for masking) and streaming it through
//!
//! # Design Decisions
//! - No retries; a failed call is final
//! - Declared size over the limit, a content-coding, or a non-text content type streams verbatim
//! - A body without a declared size that outgrows the limit while buffering
//!   switches to streaming: bytes read so far are replayed, then the rest follows
//! - Failures become terminal envelopes and mark the body as not processable

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};

use crate::config::ProxySettings;
use crate::observability::metrics;
use crate::pipeline::{ProcessingContext, Unit, UnitError};
use crate::upstream::{
    BodyStream, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse, UpstreamTimeouts,
};

/// Content types whose bodies are buffered for masking.
pub const PROCESSABLE_CONTENT_TYPES: [&str; 5] = [
    "application/json",
    "application/xml",
    "text/html",
    "text/plain",
    "text/xml",
];

/// Lowercased media type without parameters.
pub fn content_type_base(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// True when the body carries a content-coding other than `identity`.
fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("identity"))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

pub struct Forwarder {
    client: Arc<dyn UpstreamClient>,
    timeouts: UpstreamTimeouts,
    max_response_size: usize,
}

impl Forwarder {
    pub fn new(client: Arc<dyn UpstreamClient>, settings: &ProxySettings) -> Self {
        Self {
            client,
            timeouts: UpstreamTimeouts::from(&settings.timeout),
            max_response_size: settings.max_response_size,
        }
    }

    fn fail(&self, ctx: &mut ProcessingContext, error: &UpstreamError) {
        let (status, message) = match error {
            UpstreamError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout"),
            _ => (StatusCode::BAD_GATEWAY, "Bad Gateway"),
        };
        tracing::warn!(
            request_id = %ctx.request_id,
            route = ctx.route().name(),
            upstream_url = %ctx.upstream.url,
            kind = error.kind(),
            error = %error,
            "Upstream request failed"
        );
        metrics::record_upstream_error(error.kind());

        ctx.skip_response_processing = true;
        ctx.respond_error(status, message);
    }

    async fn buffer_or_stream(&self, ctx: &mut ProcessingContext, response: UpstreamResponse) {
        let UpstreamResponse {
            status,
            headers,
            mut body,
        } = response;

        let content_type = content_type_base(&headers);
        let oversized = declared_length(&headers).is_some_and(|len| len > self.max_response_size as u64);
        let encoded = is_encoded(&headers);
        if encoded && !ctx.route().mask_rules().is_empty() {
            tracing::warn!(
                request_id = %ctx.request_id,
                route = ctx.route().name(),
                "Upstream ignored accept-encoding: identity, body cannot be masked"
            );
        }
        if oversized || encoded || !PROCESSABLE_CONTENT_TYPES.contains(&content_type.as_str()) {
            tracing::debug!(
                request_id = %ctx.request_id,
                content_type = %content_type,
                oversized,
                encoded,
                "Streaming upstream response through"
            );
            pass_through(ctx, status, headers, body);
            return;
        }

        let mut buffered = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    self.fail(ctx, &error);
                    return;
                }
            };
            if buffered.len() + chunk.len() > self.max_response_size {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    buffered = buffered.len(),
                    "Undeclared body exceeded the limit, streaming the rest"
                );
                let replay = stream::iter([Ok(buffered.freeze()), Ok(chunk)]).chain(body);
                pass_through(ctx, status, headers, replay.boxed());
                return;
            }
            buffered.extend_from_slice(&chunk);
        }

        ctx.response.status = Some(status);
        ctx.response.headers = headers;
        ctx.response.body = buffered.freeze();
    }
}

/// Attach the upstream body as a lazily streamed terminal response.
fn pass_through(ctx: &mut ProcessingContext, status: StatusCode, headers: HeaderMap, body: BodyStream) {
    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    ctx.skip_response_processing = true;
    ctx.response.status = Some(status);
    ctx.response.body = Bytes::new();
    ctx.response.terminal = Some(response);
}

#[async_trait]
impl Unit for Forwarder {
    fn name(&self) -> &'static str {
        "forwarder"
    }

    fn order(&self) -> i32 {
        50
    }

    async fn on_request(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        if ctx.skip_upstream {
            return Ok(());
        }

        let request = UpstreamRequest {
            method: ctx.upstream.method.clone(),
            url: ctx.upstream.url.clone(),
            headers: ctx.upstream.headers.clone(),
            params: ctx.upstream.params.clone(),
            body: ctx.upstream.body.clone(),
            timeouts: self.timeouts,
        };

        let started = Instant::now();
        let result = self.client.send(request).await;
        ctx.upstream_latency = Some(started.elapsed());

        match result {
            Ok(response) => self.buffer_or_stream(ctx, response).await,
            Err(error) => self.fail(ctx, &error),
        }
        Ok(())
    }
}
