//! Response body redaction.
//!
//! # Responsibilities
//! - Compile mask rules once, when a route is compiled
//! - Apply a route's rules to buffered text bodies in declaration order
//! - Keep `content-length` in sync with the rewritten body
//!
//! # Design Decisions
//! - `regex` crate: linear-time matching, so untrusted patterns cannot backtrack
//! - Pattern length is bounded and bad patterns fail at load, never per request
//! - Rules compound: each rule sees the previous rule's output
//! - Non UTF-8 bodies pass through untouched

use async_trait::async_trait;
use axum::http::{header, HeaderValue};
use bytes::Bytes;
use regex::Regex;

use crate::config::MaskRule;
use crate::pipeline::{ProcessingContext, Unit, UnitError};

/// Longest accepted mask pattern, in characters.
pub const MAX_PATTERN_LEN: usize = 500;

/// Why a mask rule was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MaskRuleError {
    #[error("pattern is {len} characters long (max {MAX_PATTERN_LEN})")]
    TooLong { len: usize },

    #[error("invalid regex: {0}")]
    InvalidRegex(String),
}

/// A mask rule ready to run.
#[derive(Debug, Clone)]
pub struct CompiledMaskRule {
    regex: Regex,
    replacement: String,
    label: Option<String>,
}

impl CompiledMaskRule {
    pub fn compile(rule: &MaskRule) -> Result<Self, MaskRuleError> {
        let len = rule.pattern.chars().count();
        if len > MAX_PATTERN_LEN {
            return Err(MaskRuleError::TooLong { len });
        }
        let regex = Regex::new(&rule.pattern).map_err(|e| MaskRuleError::InvalidRegex(e.to_string()))?;

        Ok(Self {
            regex,
            replacement: expand_replacement(&rule.replacement),
            label: rule.label.clone(),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Replace every match in `text`.
    pub fn apply(&self, text: &str) -> String {
        self.regex.replace_all(text, self.replacement.as_str()).into_owned()
    }
}

/// Rewrite `\1` and `\g<name>` group references into `${1}` / `${name}`.
///
/// Native `$1`, `${name}` and `$$` are left alone, any other `$` is literal,
/// and `\\` is a literal backslash.
fn expand_replacement(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if starts_native_reference(chars.clone()) {
                out.push('$');
                if chars.peek() == Some(&'$') {
                    chars.next();
                    out.push('$');
                }
            } else {
                out.push_str("$$");
            }
            continue;
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    group.push(d);
                    chars.next();
                }
                out.push_str("${");
                out.push_str(&group);
                out.push('}');
            }
            Some('g') => {
                chars.next();
                if chars.peek() == Some(&'<') {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '>' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if closed {
                        out.push_str("${");
                        out.push_str(&name);
                        out.push('}');
                    } else {
                        out.push_str("\\g<");
                        out.push_str(&name);
                    }
                } else {
                    out.push_str("\\g");
                }
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            _ => out.push('\\'),
        }
    }
    out
}

/// True when the text after a `$` is one the regex crate expands or unescapes.
fn starts_native_reference(mut rest: std::iter::Peekable<std::str::Chars<'_>>) -> bool {
    match rest.next() {
        Some('$') => true,
        Some('{') => {
            let mut name_len = 0;
            for c in rest {
                if c == '}' {
                    return name_len > 0;
                }
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    return false;
                }
                name_len += 1;
            }
            false
        }
        Some(c) => c.is_ascii_alphanumeric() || c == '_',
        None => false,
    }
}

/// Applies the matched route's mask rules to the buffered response body.
#[derive(Debug, Default)]
pub struct ContentMasker;

impl ContentMasker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Unit for ContentMasker {
    fn name(&self) -> &'static str {
        "content_masker"
    }

    fn order(&self) -> i32 {
        80
    }

    async fn on_response(&self, ctx: &mut ProcessingContext) -> Result<(), UnitError> {
        if ctx.response.body.is_empty() || ctx.skip_response_processing {
            return Ok(());
        }
        let rules = ctx.route().mask_rules();
        if rules.is_empty() {
            return Ok(());
        }

        let Ok(text) = std::str::from_utf8(&ctx.response.body) else {
            tracing::debug!(request_id = %ctx.request_id, "Body is not UTF-8, masking skipped");
            return Ok(());
        };

        let masked = rules
            .iter()
            .fold(text.to_owned(), |body, rule| rule.apply(&body));

        ctx.response
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(masked.len()));
        ctx.response.body = Bytes::from(masked);
        Ok(())
    }
}
