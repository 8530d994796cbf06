//! Request/response processing pipeline.
//!
//! # Data Flow
//! ```text
//! matched route + inbound request
//!     → context.rs (ProcessingContext, one per request)
//!     → engine.rs request phase: units ascending by order
//!         RateLimiter → UrlBuilder → HeaderTransform → ParamTransform → Forwarder
//!     → engine.rs response phase: same units descending
//!         AccessLogger → ContentMasker → HeaderTransform
//!     → final response (terminal response, or buffered status/headers/body)
//! ```
//!
//! # Design Decisions
//! - Units are trait objects behind `Arc`, shared by every request of a snapshot
//! - The context is lent by `&mut`, so no locking inside a request
//! - Units needing global settings receive them at construction

pub mod context;
pub mod engine;
pub mod unit;
pub mod units;

pub use context::{InboundRequest, ProcessingContext, ResponseState, UpstreamDraft};
pub use engine::Pipeline;
pub use unit::{Unit, UnitError};
