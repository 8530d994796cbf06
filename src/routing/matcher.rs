//! Route matching logic.
//!
//! # Responsibilities
//! - Select the longest path prefix (character-wise, case-sensitive)
//! - Gate the winner on its method filter (case-insensitive)
//! - Distinguish "no prefix matched" from "prefix matched, method rejected"
//!
//! # Design Decisions
//! - Equal-length prefixes: first listed wins
//! - No fallback to a shorter prefix when the winner rejects the method
//! - No regex to guarantee O(n) matching

use std::sync::Arc;

use axum::http::Method;

use crate::config::RouteConfig;

/// Allowed request method for a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    Any,
    Only(Method),
}

impl MethodFilter {
    /// Parse a configured method; `*` (or empty) means any.
    pub fn parse(value: &str) -> Result<Self, axum::http::method::InvalidMethod> {
        let value = value.trim();
        if value.is_empty() || value == "*" {
            return Ok(MethodFilter::Any);
        }
        Method::from_bytes(value.to_uppercase().as_bytes()).map(MethodFilter::Only)
    }

    pub fn allows(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(expected) => expected.as_str().eq_ignore_ascii_case(method.as_str()),
        }
    }
}

/// Anything that can take part in prefix matching.
pub trait Routable {
    fn path_prefix(&self) -> &str;
    fn allows(&self, method: &Method) -> bool;
}

impl Routable for RouteConfig {
    fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    fn allows(&self, method: &Method) -> bool {
        self.method == "*" || self.method.eq_ignore_ascii_case(method.as_str())
    }
}

impl<T: Routable> Routable for Arc<T> {
    fn path_prefix(&self) -> &str {
        (**self).path_prefix()
    }

    fn allows(&self, method: &Method) -> bool {
        (**self).allows(method)
    }
}

/// Outcome of route matching.
#[derive(Debug)]
pub enum RouteMatch<'a, R> {
    Matched(&'a R),
    /// The longest prefix matched but its method filter rejected the request.
    MethodNotAllowed,
    NotFound,
}

impl<'a, R> RouteMatch<'a, R> {
    pub fn route(&self) -> Option<&'a R> {
        match self {
            RouteMatch::Matched(route) => Some(*route),
            _ => None,
        }
    }
}

/// Longest-prefix route whose prefix starts `path`, first listed on ties.
pub fn longest_prefix<'a, R: Routable>(path: &str, routes: &'a [R]) -> Option<&'a R> {
    let mut best: Option<&'a R> = None;
    for route in routes {
        let prefix = route.path_prefix();
        if !path.starts_with(prefix) {
            continue;
        }
        match best {
            Some(current) if current.path_prefix().len() >= prefix.len() => {}
            _ => best = Some(route),
        }
    }
    best
}

/// Match a request path and method against the configured routes.
pub fn match_route<'a, R: Routable>(path: &str, method: &Method, routes: &'a [R]) -> RouteMatch<'a, R> {
    match longest_prefix(path, routes) {
        Some(route) if route.allows(method) => RouteMatch::Matched(route),
        Some(_) => RouteMatch::MethodNotAllowed,
        None => RouteMatch::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, path: &str, method: &str) -> RouteConfig {
        let mut route = RouteConfig::new(name, path, "https://example.com");
        route.method = method.to_string();
        route
    }

    #[test]
    fn test_longest_prefix_wins() {
        let routes = vec![route("short", "/api", "*"), route("long", "/api/users", "*")];
        let matched = match_route("/api/users/123", &Method::GET, &routes);
        assert_eq!(matched.route().unwrap().name, "long");

        // Order in the list does not matter for different lengths
        let reversed = vec![route("long", "/api/users", "*"), route("short", "/api", "*")];
        let matched = match_route("/api/users/123", &Method::GET, &reversed);
        assert_eq!(matched.route().unwrap().name, "long");
    }

    #[test]
    fn test_prefix_is_character_wise() {
        let routes = vec![route("ab", "/ab", "*")];
        assert!(match_route("/abc", &Method::GET, &routes).route().is_some());
        assert!(matches!(match_route("/a", &Method::GET, &routes), RouteMatch::NotFound));
    }

    #[test]
    fn test_equal_prefix_first_listed_wins() {
        let routes = vec![route("first", "/api", "*"), route("second", "/api", "*")];
        let matched = match_route("/api/x", &Method::GET, &routes);
        assert_eq!(matched.route().unwrap().name, "first");
    }

    #[test]
    fn test_method_gate_has_no_fallback() {
        let routes = vec![route("any", "/api", "*"), route("orders", "/api/orders", "GET")];
        assert!(matches!(
            match_route("/api/orders", &Method::POST, &routes),
            RouteMatch::MethodNotAllowed
        ));
        let matched = match_route("/api/orders", &Method::GET, &routes);
        assert_eq!(matched.route().unwrap().name, "orders");
        // A shorter path still reaches the wildcard route
        let matched = match_route("/api/other", &Method::POST, &routes);
        assert_eq!(matched.route().unwrap().name, "any");
    }

    #[test]
    fn test_tie_break_applies_before_method_gate() {
        let routes = vec![route("get", "/api", "GET"), route("post", "/api", "POST")];
        assert!(matches!(
            match_route("/api", &Method::POST, &routes),
            RouteMatch::MethodNotAllowed
        ));
    }

    #[test]
    fn test_method_filter_is_case_insensitive() {
        let routes = vec![route("lower", "/x", "get")];
        assert!(match_route("/x", &Method::GET, &routes).route().is_some());

        assert_eq!(MethodFilter::parse("*").unwrap(), MethodFilter::Any);
        assert!(MethodFilter::parse("post").unwrap().allows(&Method::POST));
        assert!(!MethodFilter::parse("GET").unwrap().allows(&Method::POST));
    }
}
