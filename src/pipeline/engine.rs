//! Two-phase pipeline execution.
//!
//! # Responsibilities
//! - Keep registered units sorted by `order` (ties keep registration order)
//! - Run the request phase ascending and the response phase descending
//! - Short-circuit once a unit decides the response and skips upstream
//! - Turn the finished context into the client response
//!
//! # Design Decisions
//! - Request-phase failure is fatal: generic 500, response phase never runs
//! - Response-phase failure is logged and the next unit still runs
//! - The response phase walks the full active list, however far the request phase got
//! - A panicking unit is treated like a unit returning an error

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use futures_util::FutureExt;

use crate::http::request::resolve_request_id;
use crate::http::response::error_response;
use crate::observability::metrics;
use crate::pipeline::{ProcessingContext, Unit, UnitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Request,
    Response,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::Response => "response",
        }
    }
}

/// Ordered unit registry.
#[derive(Default, Clone)]
pub struct Pipeline {
    units: Vec<Arc<dyn Unit>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit and re-sort by ascending order.
    pub fn register(&mut self, unit: Arc<dyn Unit>) {
        self.units.push(unit);
        // Stable sort keeps registration order on ties
        self.units.sort_by_key(|u| u.order());
    }

    pub fn with_unit(mut self, unit: impl Unit + 'static) -> Self {
        self.register(Arc::new(unit));
        self
    }

    pub fn units(&self) -> &[Arc<dyn Unit>] {
        &self.units
    }

    /// Names of enabled units, in request-phase order.
    pub fn unit_names(&self) -> Vec<&'static str> {
        self.units
            .iter()
            .filter(|u| u.is_enabled())
            .map(|u| u.name())
            .collect()
    }

    pub async fn execute(&self, mut ctx: ProcessingContext) -> Response<Body> {
        ctx.request_id = resolve_request_id(&ctx.inbound().headers);
        ctx.started_at = Instant::now();

        let active: Vec<Arc<dyn Unit>> = self
            .units
            .iter()
            .filter(|u| u.is_enabled())
            .cloned()
            .collect();

        for unit in &active {
            if let Err(error) = run_phase(&**unit, Phase::Request, &mut ctx).await {
                tracing::error!(
                    request_id = %ctx.request_id,
                    unit = unit.name(),
                    route = ctx.route().name(),
                    error = %error,
                    "Unit failed in request phase, aborting pipeline"
                );
                metrics::record_unit_failure(unit.name(), Phase::Request.as_str());
                metrics::record_request(ctx.route().name(), 500, ctx.started_at);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    &ctx.request_id,
                    ctx.inbound().path(),
                );
            }

            if ctx.skip_upstream && ctx.has_terminal() {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    unit = unit.name(),
                    "Request phase short-circuited"
                );
                break;
            }
        }

        for unit in active.iter().rev() {
            if let Err(error) = run_phase(&**unit, Phase::Response, &mut ctx).await {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    unit = unit.name(),
                    error = %error,
                    "Unit failed in response phase, continuing"
                );
                metrics::record_unit_failure(unit.name(), Phase::Response.as_str());
            }
        }

        ctx.into_response()
    }
}

async fn run_phase(unit: &dyn Unit, phase: Phase, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
    let outcome = match phase {
        Phase::Request => AssertUnwindSafe(unit.on_request(ctx)).catch_unwind().await,
        Phase::Response => AssertUnwindSafe(unit.on_response(ctx)).catch_unwind().await,
    };
    outcome.unwrap_or_else(|panic| Err(UnitError::new(panic_message(&*panic))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
