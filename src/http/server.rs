//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health probe and the catch-all proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener with graceful shutdown
//! - Match routes and hand matched requests to the pipeline

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use http_body_util::LengthLimitError;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::gateway::Gateway;
use crate::http::request::{resolve_request_id, MakeRequestUuid};
use crate::http::response::error_response;
use crate::observability::metrics;
use crate::pipeline::{InboundRequest, ProcessingContext};
use crate::routing::RouteMatch;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            router: Self::build_router(gateway),
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(gateway: Arc<Gateway>) -> Router {
        let state = AppState { gateway };
        Router::new()
            .route("/healthz", get(health_handler))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    routes: usize,
    units: Vec<&'static str>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    let snapshot = state.gateway.snapshot();
    Json(HealthStatus {
        status: "ok",
        routes: snapshot.router.len(),
        units: snapshot.pipeline.unit_names(),
    })
}

/// Main proxy handler.
/// Looks up the route, reads the body and runs the pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    // Pin the snapshot so a concurrent reload cannot change routes mid-request
    let snapshot = state.gateway.snapshot();

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let route = match snapshot.router.match_request(&path, &parts.method) {
        RouteMatch::Matched(route) => route.clone(),
        RouteMatch::MethodNotAllowed => {
            let request_id = resolve_request_id(&parts.headers);
            tracing::warn!(request_id = %request_id, method = %parts.method, path = %path, "Method not allowed");
            metrics::record_request("none", 405, std::time::Instant::now());
            return error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed", &request_id, &path);
        }
        RouteMatch::NotFound => {
            let request_id = resolve_request_id(&parts.headers);
            tracing::warn!(request_id = %request_id, path = %path, "No route matched");
            metrics::record_request("none", 404, std::time::Instant::now());
            return error_response(StatusCode::NOT_FOUND, "No matching route", &request_id, &path);
        }
    };

    let body = match axum::body::to_bytes(body, snapshot.config.proxy.max_request_size).await {
        Ok(body) => body,
        Err(error) => {
            let request_id = resolve_request_id(&parts.headers);
            let (status, message) = if is_length_limit(&error) {
                (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
            } else {
                (StatusCode::BAD_REQUEST, "Bad Request")
            };
            tracing::warn!(request_id = %request_id, path = %path, error = %error, "Failed to read request body");
            return error_response(status, message, &request_id, &path);
        }
    };

    let inbound = InboundRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        client_addr,
    };
    snapshot
        .pipeline
        .execute(ProcessingContext::new(inbound, route))
        .await
        .into_response()
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}
