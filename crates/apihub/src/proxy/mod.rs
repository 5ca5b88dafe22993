//! Upstream forwarding.
//!
//! - `client` - pooled outbound HTTP client
//! - `forwarding` - target resolution and the forwarding call
//! - `headers` - upstream header set and the forwarding marker

mod client;
mod forwarding;
mod headers;

pub use client::{create_http_client, HttpClient};
pub use forwarding::{forward, resolve_target, substitute_params, ForwardError};
pub use headers::{upstream_headers, VALUE_APIHUB, X_FORWARDED_BY};
