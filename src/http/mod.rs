//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing)
//!     → route match (404 / 405 envelopes on miss)
//!     → pipeline (units build, forward and transform)
//!     → response.rs (error envelopes)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{resolve_request_id, X_REQUEST_ID};
pub use response::{error_response, ErrorEnvelope};
pub use server::HttpServer;
