//! Forwarding of matched requests to their upstream target.

use super::client::HttpClient;
use super::headers::upstream_headers;
use crate::matcher::{PathParams, ProxyBehavior};
use crate::response::{BoxError, GatewayBody, ResponseBuilder};
use http_body_util::BodyExt;
use hyper::{Request, Response, StatusCode, Uri};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid proxy target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("failed to build upstream request: {0}")]
    BuildRequest(#[from] hyper::http::Error),
    #[error("upstream {target} unreachable: {source}")]
    UpstreamUnreachable {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
    #[error("upstream {target} did not respond within {}ms", .timeout.as_millis())]
    UpstreamTimeout { target: String, timeout: Duration },
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::InvalidTarget { .. } => StatusCode::BAD_GATEWAY,
            ForwardError::BuildRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForwardError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            ForwardError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn into_response(self) -> Response<GatewayBody> {
        let status = self.status();
        ResponseBuilder::text(status, format!("{} - {}", status.as_u16(), self)).build()
    }
}

/// Replace every `:name` occurrence in `template` with its captured value.
/// Longer names are substituted first so `:id` never rewrites part of `:idx`.
pub fn substitute_params(template: &str, params: &PathParams) -> String {
    let mut names: Vec<&String> = params.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut resolved = template.to_string();
    for name in names {
        resolved = resolved.replace(&format!(":{name}"), &params[name]);
    }
    resolved
}

/// Resolve the absolute upstream URI for one request. The inbound query is
/// appended when the target carries none of its own.
pub fn resolve_target(
    behavior: &ProxyBehavior,
    params: &PathParams,
    inbound_query: Option<&str>,
) -> Result<Uri, ForwardError> {
    let mut target = if behavior.is_static {
        behavior.target.clone()
    } else {
        substitute_params(&behavior.target, params)
    };

    if let Some(query) = inbound_query.filter(|q| !q.is_empty()) {
        if !target.contains('?') {
            target.push('?');
            target.push_str(query);
        }
    }

    let uri: Uri = target.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        ForwardError::InvalidTarget {
            target: target.clone(),
            reason: e.to_string(),
        }
    })?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(ForwardError::InvalidTarget {
            target,
            reason: "target must be an absolute URL".to_string(),
        });
    }
    Ok(uri)
}

/// Send `request` upstream and stream the upstream response back.
///
/// The returned future owns the upstream call; dropping it (client gone,
/// request timeout) aborts the call.
pub async fn forward(
    client: &HttpClient,
    request: Request<GatewayBody>,
    params: &PathParams,
    behavior: &ProxyBehavior,
) -> Result<Response<GatewayBody>, ForwardError> {
    let (parts, body) = request.into_parts();
    let uri = resolve_target(behavior, params, parts.uri.query())?;
    let target = uri.to_string();

    let mut upstream_request = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(body)?;
    *upstream_request.headers_mut() = upstream_headers(&parts.headers, &behavior.headers);

    debug!(upstream = %target, "forwarding request");

    let call = client.request(upstream_request);
    let result = match behavior.timeout {
        Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|_| {
            ForwardError::UpstreamTimeout {
                target: target.clone(),
                timeout,
            }
        })?,
        None => call.await,
    };
    let upstream_response = result.map_err(|source| ForwardError::UpstreamUnreachable {
        target: target.clone(),
        source,
    })?;

    let (parts, body) = upstream_response.into_parts();
    let body = body
        .map_err(move |e| {
            warn!(upstream = %target, error = %e, "upstream body copy failed");
            BoxError::from(e)
        })
        .boxed();
    Ok(Response::from_parts(parts, body))
}
