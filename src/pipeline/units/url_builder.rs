//! Builds the upstream URL from the matched route.

use async_trait::async_trait;

use crate::pipeline::{ProcessingContext, Unit, UnitError};

/// Strips the route prefix and joins the remainder onto the route target.
#[derive(Debug, Default)]
pub struct UrlBuilder;

impl UrlBuilder {
    pub fn new() -> Self {
        Self
    }
}

/// Join `target` and what is left of `path` after removing `prefix`.
pub fn upstream_url(target: &str, prefix: &str, path: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    let base = target.trim_end_matches('/');
    if rest.is_empty() {
        format!("{}/", base)
    } else if rest.starts_with('/') {
        format!("{}{}", base, rest)
    } else {
        format!("{}/{}", base, rest)
    }
}

#[async_trait]
impl Unit for UrlBuilder {
    fn name(&self) -> &'static str {
        "url_builder"
    }

    fn order(&self) -> i32 {
        10
    }

    async fn on_request(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        let route = ctx.route().config();
        let url = upstream_url(&route.target, &route.path_prefix, ctx.inbound().path());
        let body = ctx.inbound().body.clone();

        ctx.upstream.url = url;
        ctx.upstream.body = body;
        Ok(())
    }
}
