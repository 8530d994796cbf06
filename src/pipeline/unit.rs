//! The contract every pipeline unit implements.

use async_trait::async_trait;

use crate::pipeline::ProcessingContext;

/// Failure raised by a unit.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UnitError {
    message: String,
}

impl UnitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A pluggable pipeline step.
///
/// Both phases default to no-ops. Lower `order` runs earlier in the request
/// phase and later in the response phase. State a unit keeps across requests
/// must be safe under concurrent access.
#[async_trait]
pub trait Unit: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    fn order(&self) -> i32 {
        100
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn on_request(&self, _ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        Ok(())
    }

    async fn on_response(&self, _ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        Ok(())
    }
}
