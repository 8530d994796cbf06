//! Header rewriting in both directions.
//!
//! # Responsibilities
//! - Copy inbound headers minus the configured strip-list
//! - Merge route-level headers and forwarding metadata
//! - Ask for an unencoded body on routes that mask responses
//! - Scrub hop-by-hop headers from the response, buffered or streamed
//!
//! # Design Decisions
//! - `HeaderName` is lowercase, so strip-list checks are case-insensitive for free
//! - `content-length` is never copied upstream; the client recomputes it

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::http::request::X_REQUEST_ID;
use crate::pipeline::{ProcessingContext, Unit, UnitError};

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

#[derive(Debug, Clone)]
pub struct HeaderTransform {
    strip: Vec<HeaderName>,
}

impl HeaderTransform {
    pub fn new(strip_headers: &[String]) -> Self {
        let strip = strip_headers
            .iter()
            .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
            .collect();
        Self { strip }
    }

    fn is_stripped(&self, name: &HeaderName) -> bool {
        *name == header::CONTENT_LENGTH || self.strip.contains(name)
    }
}

fn scrub(headers: &mut HeaderMap, request_id: &str) {
    // Response headers that only describe the upstream hop
    headers.remove(header::CONNECTION);
    headers.remove("keep-alive");
    headers.remove(header::TRANSFER_ENCODING);
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(&X_REQUEST_ID, value);
    }
}

#[async_trait]
impl Unit for HeaderTransform {
    fn name(&self) -> &'static str {
        "header_transform"
    }

    fn order(&self) -> i32 {
        20
    }

    async fn on_request(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        let inbound = ctx.inbound();
        let mut headers = HeaderMap::with_capacity(inbound.headers.len() + 4);
        for (name, value) in inbound.headers.iter() {
            if !self.is_stripped(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        for (name, value) in &ctx.route().config().request_rules.add_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| UnitError::new(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| UnitError::new(format!("invalid value for header '{}'", name)))?;
            headers.insert(name, value);
        }

        // Masking needs a plain body
        if !ctx.route().mask_rules().is_empty() {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }

        if let Some(addr) = inbound.client_addr {
            let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{}, {}", existing, addr.ip()),
                None => addr.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert(&X_FORWARDED_FOR, value);
            }
        }
        if let Some(host) = inbound.headers.get(header::HOST) {
            headers.insert(&X_FORWARDED_HOST, host.clone());
        }
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert(&X_REQUEST_ID, value);
        }

        ctx.upstream.headers = headers;
        Ok(())
    }

    async fn on_response(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        let request_id = ctx.request_id.clone();
        scrub(&mut ctx.response.headers, &request_id);
        if let Some(terminal) = ctx.response.terminal.as_mut() {
            scrub(terminal.headers_mut(), &request_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProxySettings, RouteConfig};
    use crate::pipeline::context::{test_context, InboundRequest, ProcessingContext};
    use axum::body::Body;
    use axum::http::{Response, StatusCode};
    use std::sync::Arc;

    fn context_with_headers(pairs: &[(&'static str, &'static str)]) -> ProcessingContext {
        let mut route = RouteConfig::new("h", "/", "http://up");
        route
            .request_rules
            .add_headers
            .insert("X-Api-Key".into(), "secret".into());
        let base = test_context(route, "/x");

        let mut inbound: InboundRequest = base.inbound().clone();
        for (name, value) in pairs {
            inbound.headers.append(*name, HeaderValue::from_static(*value));
        }
        let mut ctx = ProcessingContext::new(inbound, Arc::new(base.route().clone()));
        ctx.request_id = "rid-7".into();
        ctx
    }

    #[tokio::test]
    async fn test_request_headers_are_filtered_and_enriched() {
        let transform = HeaderTransform::new(&ProxySettings::default().strip_headers);
        let mut ctx = context_with_headers(&[
            ("host", "gateway.local"),
            ("connection", "keep-alive"),
            ("accept", "application/json"),
            ("x-api-key", "client-supplied"),
            ("content-length", "0"),
        ]);

        transform.on_request(&mut ctx).await.unwrap();
        let headers = &ctx.upstream.headers;
        assert!(headers.get("host").is_none());
        assert!(headers.get("connection").is_none());
        assert!(headers.get("content-length").is_none());
        assert_eq!(headers["accept"], "application/json");
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers["x-forwarded-for"], "127.0.0.1");
        assert_eq!(headers["x-forwarded-host"], "gateway.local");
        assert_eq!(headers["x-request-id"], "rid-7");
    }

    #[tokio::test]
    async fn test_masked_routes_request_identity_encoding() {
        let transform = HeaderTransform::new(&[]);

        let mut masked = RouteConfig::new("m", "/", "http://up");
        masked
            .response_rules
            .mask_regex
            .push(crate::config::MaskRule::new(r"\d+", "#"));
        let mut ctx = test_context(masked, "/x");
        let mut inbound = ctx.inbound().clone();
        inbound
            .headers
            .insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
        ctx = ProcessingContext::new(inbound, Arc::new(ctx.route().clone()));
        transform.on_request(&mut ctx).await.unwrap();
        assert_eq!(ctx.upstream.headers[header::ACCEPT_ENCODING], "identity");

        let mut plain = context_with_headers(&[("accept-encoding", "gzip")]);
        transform.on_request(&mut plain).await.unwrap();
        assert_eq!(plain.upstream.headers[header::ACCEPT_ENCODING], "gzip");
    }

    #[tokio::test]
    async fn test_strip_list_is_case_insensitive() {
        let transform = HeaderTransform::new(&["X-SECRET".to_string()]);
        let mut ctx = context_with_headers(&[("x-secret", "1"), ("x-forwarded-for", "10.0.0.1")]);
        transform.on_request(&mut ctx).await.unwrap();
        assert!(ctx.upstream.headers.get("x-secret").is_none());
        assert_eq!(ctx.upstream.headers["x-forwarded-for"], "10.0.0.1, 127.0.0.1");
    }

    #[tokio::test]
    async fn test_response_hop_headers_removed_everywhere() {
        let transform = HeaderTransform::new(&[]);
        let mut ctx = context_with_headers(&[]);
        ctx.response.headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        ctx.response.headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));

        let mut streamed = Response::new(Body::empty());
        *streamed.status_mut() = StatusCode::OK;
        streamed
            .headers_mut()
            .insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        streamed
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        ctx.response.terminal = Some(streamed);

        transform.on_response(&mut ctx).await.unwrap();
        assert!(ctx.response.headers.get(header::CONNECTION).is_none());
        assert!(ctx.response.headers.get("keep-alive").is_none());

        let terminal = ctx.response.terminal.as_ref().unwrap();
        assert!(terminal.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(terminal.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(terminal.headers()["x-request-id"], "rid-7");
    }
}
