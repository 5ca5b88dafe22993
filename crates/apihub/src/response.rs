//! Response bodies and a small builder for responses the gateway produces
//! itself (mocks and diagnostics).

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};
use std::convert::Infallible;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type used on both sides of the gateway.
pub type GatewayBody = BoxBody<Bytes, BoxError>;

pub fn full_body(bytes: impl Into<Bytes>) -> GatewayBody {
    Full::new(bytes.into())
        .map_err(|never: Infallible| match never {})
        .boxed()
}

pub fn empty_body() -> GatewayBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed()
}

/// Box any body whose error converts into [`BoxError`].
pub fn boxed_body<B>(body: B) -> GatewayBody
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}

pub struct ResponseBuilder {
    status: StatusCode,
    body: Bytes,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        ResponseBuilder {
            status,
            body: Bytes::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Plain-text response.
    pub fn text(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status)
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .body(message.into())
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Insert every header of `headers`, replacing same-named ones.
    pub fn merge_headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn build(self) -> Response<GatewayBody> {
        let mut response = Response::new(full_body(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(response: Response<GatewayBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_builder_status_headers_and_body() {
        let response = ResponseBuilder::new(StatusCode::CREATED)
            .header(
                HeaderName::from_static("x-custom"),
                HeaderValue::from_static("1"),
            )
            .body("done")
            .build();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-custom"], "1");
        assert_eq!(body_text(response).await, "done");
    }

    #[tokio::test]
    async fn test_text_sets_content_type() {
        let response = ResponseBuilder::text(StatusCode::NOT_FOUND, "missing").build();
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "missing");
    }

    #[test]
    fn test_merge_headers_overrides() {
        let mut extra = HeaderMap::new();
        extra.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = ResponseBuilder::text(StatusCode::OK, "{}")
            .merge_headers(&extra)
            .build();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers().get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_has_no_bytes() {
        let bytes = empty_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}
