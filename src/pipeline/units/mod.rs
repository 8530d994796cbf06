//! Built-in pipeline units.
//!
//! | Unit            | order | request phase                   | response phase   |
//! |-----------------|-------|---------------------------------|------------------|
//! | RateLimiter     | 5     | token bucket, may short-circuit | -                |
//! | UrlBuilder      | 10    | target URL, body capture        | -                |
//! | HeaderTransform | 20    | strip / add / forwarding info   | hop-by-hop scrub |
//! | ParamTransform  | 30    | query merge                     | -                |
//! | Forwarder       | 50    | upstream call                   | -                |
//! | ContentMasker   | 80    | -                               | body redaction   |
//! | AccessLogger    | 200   | -                               | access record    |

pub mod access_logger;
pub mod content_masker;
pub mod forwarder;
pub mod header_transform;
pub mod param_transform;
pub mod rate_limit;
pub mod url_builder;

pub use access_logger::AccessLogger;
pub use content_masker::{CompiledMaskRule, ContentMasker, MaskRuleError};
pub use forwarder::Forwarder;
pub use header_transform::HeaderTransform;
pub use param_transform::ParamTransform;
pub use rate_limit::RateLimiter;
pub use url_builder::UrlBuilder;
