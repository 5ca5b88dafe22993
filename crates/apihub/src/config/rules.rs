//! Rule records as they appear in a config document.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of a config document: a request pattern plus exactly one of
/// `response` (mock) or `proxy`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub request: Option<RequestMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MockResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyTarget>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestMatch {
    pub method: String,
    pub path: String,
    /// Headers that must be present with exactly this value.
    /// Non-string scalars are compared in their textual form.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyTarget {
    /// Upstream URL; `:name` markers are replaced with captured path parameters.
    pub url: String,
    /// Headers set on the upstream request, overriding inbound ones.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Upstream timeout in milliseconds. 0 disables the per-rule timeout.
    #[serde(default)]
    pub timeout: u64,
}

/// Render a scalar config value the way it should appear on the wire.
pub fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
