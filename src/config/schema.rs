//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    /// Proxy listener (host/port).
    pub server: ServerConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Forwarding behaviour shared by every route.
    pub proxy: ProxySettings,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route definitions, in declaration order.
    pub routes: Vec<RouteConfig>,
}

/// Proxy listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "127.0.0.1").
    pub host: String,

    /// Port to bind.
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8001".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Global forwarding settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProxySettings {
    /// Upstream timeouts.
    pub timeout: TimeoutConfig,

    /// Responses declaring a larger body are streamed, never masked.
    pub max_response_size: usize,

    /// Largest inbound request body accepted.
    pub max_request_size: usize,

    /// Request headers never forwarded upstream (case-insensitive).
    pub strip_headers: Vec<String>,

    /// Upstream connection pool limits.
    pub pool: PoolConfig,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout: TimeoutConfig::default(),
            max_response_size: 10 * 1024 * 1024, // 10MB
            max_request_size: 10 * 1024 * 1024,
            strip_headers: [
                "Host",
                "Connection",
                "Transfer-Encoding",
                "Upgrade",
                "Proxy-Connection",
                "Proxy-Authenticate",
                "Proxy-Authorization",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            pool: PoolConfig::default(),
        }
    }
}

/// Timeout configuration for upstream calls, in (fractional) seconds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    pub connect_secs: f64,

    /// Maximum wait for each read from the upstream.
    pub read_secs: f64,

    /// Maximum time to send the request and receive the response head.
    pub write_secs: f64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs_f64(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs_f64(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs_f64(self.write_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5.0,
            read_secs: 30.0,
            write_secs: 30.0,
        }
    }
}

/// Upstream connection pool limits.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent upstream connections.
    pub max_connections: usize,

    /// Maximum idle keep-alive connections per upstream host.
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_idle_per_host: 20,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per second per IP.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst_size: 50,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A single proxied route.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteConfig {
    /// Unique route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match (character-wise).
    #[serde(rename = "path", alias = "path_prefix")]
    pub path_prefix: String,

    /// Upstream base URL.
    pub target: String,

    /// Allowed method, or "*" for any.
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub request_rules: RequestRules,

    #[serde(default)]
    pub response_rules: ResponseRules,
}

fn default_method() -> String {
    "*".to_string()
}

impl RouteConfig {
    /// Create a route with empty rules.
    pub fn new(
        name: impl Into<String>,
        path_prefix: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path_prefix: path_prefix.into(),
            target: target.into(),
            method: default_method(),
            description: None,
            request_rules: RequestRules::default(),
            response_rules: ResponseRules::default(),
        }
    }

    /// Trim trailing slashes from the prefix and upper-case the method.
    pub fn normalize(&mut self) {
        let trimmed = self.path_prefix.trim_end_matches('/');
        self.path_prefix = if trimmed.is_empty() && self.path_prefix.starts_with('/') {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        self.method = self.method.trim().to_uppercase();
    }
}

/// Outbound request rewriting rules.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RequestRules {
    /// Query parameters to add (override inbound values).
    pub add_params: BTreeMap<String, String>,

    /// Headers to add (override inbound values).
    pub add_headers: BTreeMap<String, String>,

    /// Query parameters to delete, applied after additions.
    pub del_params: Vec<String>,
}

/// Response rewriting rules.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ResponseRules {
    /// Ordered masking rules; each runs on the previous rule's output.
    pub mask_regex: Vec<MaskRule>,
}

/// A regex substitution applied to buffered response bodies.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MaskRule {
    pub pattern: String,

    /// Supports `\1`, `\g<name>`, `$1` and `${name}` group references.
    pub replacement: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl MaskRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            label: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_route() {
        let mut route = RouteConfig::new("users", "/api/users/", "http://up");
        route.method = "get".into();
        route.normalize();
        assert_eq!(route.path_prefix, "/api/users");
        assert_eq!(route.method, "GET");

        let mut root = RouteConfig::new("root", "///", "http://up");
        root.normalize();
        assert_eq!(root.path_prefix, "/");
    }

    #[test]
    fn test_route_uses_original_field_names() {
        let route: RouteConfig = toml::from_str(
            r##"
            name = "demo"
            path = "/api"
            target = "http://up"

            [request_rules]
            del_params = ["debug"]

            [[response_rules.mask_regex]]
            pattern = "\\d+"
            replacement = "#"
            "##,
        )
        .unwrap();
        assert_eq!(route.path_prefix, "/api");
        assert_eq!(route.method, "*");
        assert_eq!(route.request_rules.del_params, vec!["debug".to_string()]);
        assert_eq!(route.response_rules.mask_regex.len(), 1);
        assert_eq!(route.response_rules.mask_regex[0].replacement, "#");
    }

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.server.bind_address(), "127.0.0.1:8000");
        assert_eq!(config.proxy.max_response_size, 10 * 1024 * 1024);
        assert!(config.proxy.strip_headers.iter().any(|h| h == "Host"));
        assert!(!config.rate_limit.enabled);
        assert!(config.routes.is_empty());
    }
}
