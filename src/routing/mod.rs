//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, method)
//!     → router.rs (route lookup over compiled routes)
//!     → matcher.rs (longest prefix, then method gate)
//!     → Return: Matched route, MethodNotAllowed or NotFound
//!
//! Route Compilation (at load / reload):
//!     RouteConfig[]
//!     → Parse method filters, compile mask rules
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at load, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{match_route, MethodFilter, Routable, RouteMatch};
pub use router::{CompiledRoute, RouteError, Router};
