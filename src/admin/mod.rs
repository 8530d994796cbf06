//! Administrative HTTP API.
//!
//! # Data Flow
//! ```text
//! Admin request (separate listener)
//!     → auth.rs (Bearer token against admin.api_key)
//!     → handlers.rs
//!         reads:  gateway snapshot (status, routes, config)
//!         writes: ConfigStore::save (atomic) → Gateway::apply (snapshot swap)
//! ```
//!
//! # Design Decisions
//! - Never served on the proxy port
//! - The api key is read from the live snapshot, so a key change applies immediately
//! - The api key is redacted from every response

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::config::ConfigStore;
use crate::gateway::Gateway;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<Gateway>,
    pub store: Arc<ConfigStore>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/config", get(get_config).put(put_config))
        .route("/admin/config/validate", post(validate_config))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
