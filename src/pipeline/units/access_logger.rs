//! One structured access record per request.

use async_trait::async_trait;

use crate::observability::metrics;
use crate::pipeline::{ProcessingContext, Unit, UnitError};

/// Emits the access record under the `access` target and updates request metrics.
#[derive(Debug, Default)]
pub struct AccessLogger;

impl AccessLogger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Unit for AccessLogger {
    fn name(&self) -> &'static str {
        "access_logger"
    }

    fn order(&self) -> i32 {
        200
    }

    async fn on_response(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        let total_ms = ctx.started_at.elapsed().as_millis() as u64;
        let upstream_ms = ctx.upstream_latency.map(|d| d.as_millis() as u64);
        let status = ctx.final_status().as_u16();
        let inbound = ctx.inbound();

        tracing::info!(
            target: "access",
            request_id = %ctx.request_id,
            method = %inbound.method,
            path = %inbound.path(),
            route = ctx.route().name(),
            upstream_url = %ctx.upstream.url,
            status,
            upstream_ms,
            total_ms,
            "request completed"
        );
        metrics::record_request(ctx.route().name(), status, ctx.started_at);
        Ok(())
    }
}
