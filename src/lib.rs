//! Secure proxy gateway library.
//!
//! A reverse proxy whose request/response handling is an ordered pipeline of
//! units: URL building, header and parameter rewriting, the upstream call,
//! response masking and access logging.

pub mod admin;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod upstream;

pub use config::SystemConfig;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
