//! Query parameter rewriting.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::config::RequestRules;
use crate::pipeline::{ProcessingContext, Unit, UnitError};

/// Merges route-level parameters into the inbound query string.
#[derive(Debug, Default)]
pub struct ParamTransform;

impl ParamTransform {
    pub fn new() -> Self {
        Self
    }
}

/// Inbound pairs minus added/deleted keys, followed by added pairs not deleted.
///
/// Repeated inbound keys keep every value and their relative order.
pub fn merge_params(query: Option<&str>, rules: &RequestRules) -> Vec<(String, String)> {
    let deleted: HashSet<&str> = rules.del_params.iter().map(String::as_str).collect();

    let mut merged: Vec<(String, String)> = url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .filter(|(key, _)| !deleted.contains(&**key) && !rules.add_params.contains_key(&**key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    merged.extend(
        rules
            .add_params
            .iter()
            .filter(|(key, _)| !deleted.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    merged
}

#[async_trait]
impl Unit for ParamTransform {
    fn name(&self) -> &'static str {
        "param_transform"
    }

    fn order(&self) -> i32 {
        30
    }

    async fn on_request(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        let params = merge_params(ctx.inbound().query(), &ctx.route().config().request_rules);
        ctx.upstream.params = params;
        Ok(())
    }
}
