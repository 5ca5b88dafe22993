//! Header handling for upstream requests.

use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::HeaderMap;

/// Marker header set on every request the gateway forwards.
pub static X_FORWARDED_BY: HeaderName = HeaderName::from_static("x-forwarded-by");
pub static VALUE_APIHUB: HeaderValue = HeaderValue::from_static("apihub");

/// Build the header set for an upstream request: every inbound header except
/// `host`, then the rule's headers replacing same-named ones, then the
/// forwarding marker.
pub fn upstream_headers(inbound: &HeaderMap, rule_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + rule_headers.len() + 1);
    for (name, value) in inbound {
        if name != HOST {
            headers.append(name.clone(), value.clone());
        }
    }
    for name in rule_headers.keys() {
        headers.remove(name);
    }
    for (name, value) in rule_headers {
        headers.append(name.clone(), value.clone());
    }
    headers.insert(X_FORWARDED_BY.clone(), VALUE_APIHUB.clone());
    headers
}
