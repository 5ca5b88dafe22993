use super::SharedConfig;
use crate::config::GatewaySettings;
use crate::dispatch::dispatch;
use crate::matcher::find_matching_rule;
use crate::middleware;
use crate::proxy::HttpClient;
use crate::rate_limit::RateLimiter;
use crate::response::{boxed_body, GatewayBody, ResponseBuilder};
use http_body_util::Limited;
use hyper::body::Incoming;
use hyper::header::CONTENT_LENGTH;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Everything a connection handler needs, shared across connections.
pub struct GatewayState {
    pub config: SharedConfig,
    pub client: HttpClient,
    pub limiter: Option<Arc<RateLimiter>>,
    pub settings: GatewaySettings,
}

impl GatewayState {
    pub fn new(config: SharedConfig, client: HttpClient, settings: GatewaySettings) -> Self {
        let limiter = settings
            .rate_limit
            .clone()
            .map(|limits| Arc::new(RateLimiter::new(limits)));
        Self {
            config,
            client,
            limiter,
            settings,
        }
    }
}

/// Connection-level entry point: request log, then rate limiting, then the
/// gateway itself.
pub async fn handle_request(
    request: Request<Incoming>,
    state: Arc<GatewayState>,
    peer: SocketAddr,
) -> Result<Response<GatewayBody>, Infallible> {
    let response = middleware::request_log(request, |request| async move {
        middleware::rate_limit(state.limiter.as_deref(), Some(peer), request, |request| {
            guarded(request, &state)
        })
        .await
    })
    .await;
    Ok(response)
}

async fn guarded(request: Request<Incoming>, state: &GatewayState) -> Response<GatewayBody> {
    let max = state.settings.max_request_size;
    if max == 0 {
        return serve_request(state, request.map(boxed_body)).await;
    }

    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > max) {
        return ResponseBuilder::text(
            StatusCode::PAYLOAD_TOO_LARGE,
            "413 - Request Entity Too Large",
        )
        .build();
    }

    let limit = usize::try_from(max).unwrap_or(usize::MAX);
    serve_request(state, request.map(|body| boxed_body(Limited::new(body, limit)))).await
}

/// Match the request against the active rules and dispatch it within the
/// request timeout.
pub async fn serve_request(
    state: &GatewayState,
    request: Request<GatewayBody>,
) -> Response<GatewayBody> {
    let config = state.config.load_full();
    let matched = find_matching_rule(
        &config.rules,
        request.method(),
        request.uri().path(),
        request.headers(),
    );
    let dispatched = dispatch(&state.client, request, matched);

    let timeout = state.settings.request_timeout;
    if timeout.is_zero() {
        return dispatched.await;
    }
    match tokio::time::timeout(timeout, dispatched).await {
        Ok(response) => response,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
            ResponseBuilder::text(StatusCode::GATEWAY_TIMEOUT, "504 - Gateway Timeout").build()
        }
    }
}
