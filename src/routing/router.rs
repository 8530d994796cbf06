//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes (method filter + masking rules)
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Mask rules compiled once here, never at request time
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Explicit NoMatch rather than silent default

use std::sync::Arc;

use axum::http::Method;

use crate::config::RouteConfig;
use crate::pipeline::units::content_masker::{CompiledMaskRule, MaskRuleError};
use crate::routing::matcher::{match_route, MethodFilter, Routable, RouteMatch};

/// Error raised while compiling a route.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route '{route}': invalid method '{method}'")]
    InvalidMethod { route: String, method: String },

    #[error("route '{route}': {source}")]
    Mask {
        route: String,
        #[source]
        source: MaskRuleError,
    },
}

/// A route ready for matching and masking.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    config: RouteConfig,
    method: MethodFilter,
    mask_rules: Vec<CompiledMaskRule>,
}

impl CompiledRoute {
    pub fn compile(config: RouteConfig) -> Result<Self, RouteError> {
        let method = MethodFilter::parse(&config.method).map_err(|_| RouteError::InvalidMethod {
            route: config.name.clone(),
            method: config.method.clone(),
        })?;

        let mask_rules = config
            .response_rules
            .mask_regex
            .iter()
            .map(CompiledMaskRule::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| RouteError::Mask {
                route: config.name.clone(),
                source,
            })?;

        Ok(Self {
            config,
            method,
            mask_rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn method_filter(&self) -> &MethodFilter {
        &self.method
    }

    pub fn mask_rules(&self) -> &[CompiledMaskRule] {
        &self.mask_rules
    }
}

impl Routable for CompiledRoute {
    fn path_prefix(&self) -> &str {
        &self.config.path_prefix
    }

    fn allows(&self, method: &Method) -> bool {
        self.method.allows(method)
    }
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Arc<CompiledRoute>>,
}

impl Router {
    /// Compile routes, keeping declaration order for tie-breaking.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteError> {
        let routes = routes
            .iter()
            .cloned()
            .map(|r| CompiledRoute::compile(r).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(routes = routes.len(), "Route table compiled");
        Ok(Self { routes })
    }

    pub fn match_request(&self, path: &str, method: &Method) -> RouteMatch<'_, Arc<CompiledRoute>> {
        match_route(path, method, &self.routes)
    }

    pub fn routes(&self) -> &[Arc<CompiledRoute>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
