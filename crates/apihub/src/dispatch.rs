//! Turns a match result into a response.

use crate::matcher::{MatchResult, MockBehavior, NoMatch, RuleBehavior};
use crate::proxy::{forward, HttpClient};
use crate::response::{GatewayBody, ResponseBuilder};
use hyper::{Request, Response, StatusCode};
use tracing::{debug, warn};

pub async fn dispatch(
    client: &HttpClient,
    request: Request<GatewayBody>,
    matched: MatchResult<'_>,
) -> Response<GatewayBody> {
    let rule_match = match matched {
        MatchResult::Matched(rule_match) => rule_match,
        MatchResult::NoMatch(no_match) => return not_found(&no_match),
    };

    match &rule_match.rule.behavior {
        RuleBehavior::Mock(mock) => serve_mock(mock),
        RuleBehavior::Proxy(proxy) => {
            match forward(client, request, &rule_match.params, proxy).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(rule = %rule_match.rule.path, error = %e, "proxy forwarding failed");
                    e.into_response()
                }
            }
        }
    }
}

pub fn serve_mock(mock: &MockBehavior) -> Response<GatewayBody> {
    ResponseBuilder::new(mock.status)
        .merge_headers(&mock.headers)
        .body(mock.body.clone())
        .build()
}

pub fn not_found(no_match: &NoMatch) -> Response<GatewayBody> {
    debug!(reasons = %no_match, "no rule matched");
    ResponseBuilder::text(StatusCode::NOT_FOUND, no_match.to_string()).build()
}
