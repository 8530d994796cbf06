//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits non-zero, addresses parse)
//! - Reject duplicate route names and malformed targets
//! - Compile every masking rule so bad patterns never reach request time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SystemConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, Method};

use crate::config::schema::{RouteConfig, SystemConfig};
use crate::pipeline::units::content_masker::CompiledMaskRule;

/// A single offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the field, e.g. `routes[0].target`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a whole configuration, collecting every problem.
pub fn validate_config(config: &SystemConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let bind = config.server.bind_address();
    if bind.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server",
            format!("'{}' is not a valid socket address", bind),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a valid socket address", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    let timeouts = [
        ("proxy.timeout.connect_secs", config.proxy.timeout.connect_secs),
        ("proxy.timeout.read_secs", config.proxy.timeout.read_secs),
        ("proxy.timeout.write_secs", config.proxy.timeout.write_secs),
    ];
    for (field, secs) in timeouts {
        if !secs.is_finite() || secs <= 0.0 {
            errors.push(ValidationError::new(field, "must be a positive number of seconds"));
        }
    }

    if config.proxy.max_response_size == 0 {
        errors.push(ValidationError::new("proxy.max_response_size", "must be greater than 0"));
    }
    if config.proxy.max_request_size == 0 {
        errors.push(ValidationError::new("proxy.max_request_size", "must be greater than 0"));
    }
    if config.proxy.pool.max_connections == 0 {
        errors.push(ValidationError::new("proxy.pool.max_connections", "must be greater than 0"));
    }
    for (i, header) in config.proxy.strip_headers.iter().enumerate() {
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("proxy.strip_headers[{}]", i),
                format!("'{}' is not a valid header name", header),
            ));
        }
    }

    if config.rate_limit.enabled
        && (config.rate_limit.requests_per_second == 0 || config.rate_limit.burst_size == 0)
    {
        errors.push(ValidationError::new(
            "rate_limit",
            "requests_per_second and burst_size must be greater than 0",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a valid socket address",
        ));
    }

    let mut names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if !route.name.is_empty() && !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{}].name", i),
                format!("duplicate route name '{}'", route.name),
            ));
        }
        validate_route(i, route, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(index: usize, route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("routes[{}].{}", index, name);

    if route.name.trim().is_empty() {
        errors.push(ValidationError::new(field("name"), "must not be empty"));
    }

    if !route.path_prefix.starts_with('/') {
        errors.push(ValidationError::new(field("path"), "must start with '/'"));
    }

    match url::Url::parse(&route.target) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => errors.push(ValidationError::new(
            field("target"),
            format!("unsupported target '{}' (scheme {})", route.target, url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            field("target"),
            format!("'{}' is not a valid URL: {}", route.target, e),
        )),
    }

    if route.method != "*" && Method::from_bytes(route.method.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            field("method"),
            format!("'{}' is not a valid HTTP method", route.method),
        ));
    }

    for name in route.request_rules.add_headers.keys() {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                field("request_rules.add_headers"),
                format!("'{}' is not a valid header name", name),
            ));
        }
    }

    for (i, rule) in route.response_rules.mask_regex.iter().enumerate() {
        if let Err(e) = CompiledMaskRule::compile(rule) {
            errors.push(ValidationError::new(
                field(&format!("response_rules.mask_regex[{}].pattern", i)),
                e.to_string(),
            ));
        }
    }
}
