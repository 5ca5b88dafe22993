//! Request-wrapping middleware.
//!
//! Each middleware takes the request and the rest of the chain as `next`,
//! so the order of nesting in the connection handler is the order they run.

use crate::rate_limit::{client_key, Admission, RateLimiter};
use crate::response::{GatewayBody, ResponseBuilder};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info};

/// Log one line per request once the response head is ready.
pub async fn request_log<B, F, Fut>(request: Request<B>, next: F) -> Response<GatewayBody>
where
    F: FnOnce(Request<B>) -> Fut,
    Fut: Future<Output = Response<GatewayBody>>,
{
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next(request).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match response.body().size_hint().exact() {
        Some(bytes) => info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            bytes,
            elapsed_ms,
            "request completed"
        ),
        None => info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed_ms,
            "request completed"
        ),
    }
    response
}

/// Reject with 429 when the client has used up its window. A `None` limiter
/// admits everything.
pub async fn rate_limit<B, F, Fut>(
    limiter: Option<&RateLimiter>,
    peer: Option<SocketAddr>,
    request: Request<B>,
    next: F,
) -> Response<GatewayBody>
where
    F: FnOnce(Request<B>) -> Fut,
    Fut: Future<Output = Response<GatewayBody>>,
{
    let Some(limiter) = limiter else {
        return next(request).await;
    };

    let key = client_key(request.headers(), peer);
    match limiter.admit(&key) {
        Admission::Admitted => next(request).await,
        Admission::Rejected => {
            debug!(client = %key, "rate limit exceeded");
            too_many_requests()
        }
    }
}

pub fn too_many_requests() -> Response<GatewayBody> {
    ResponseBuilder::text(StatusCode::TOO_MANY_REQUESTS, "429 - Too Many Requests").build()
}
