use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;

/// Response produced by a handler or by the gateway itself.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Plain-text response with `Content-Type: text/plain; charset=utf-8`.
    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, body).with_header(CONTENT_TYPE, "text/plain; charset=utf-8")
    }

    pub fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "404 page not found")
    }

    /// Fixed-text rejection for suspended or throttled clients.
    pub fn too_many_requests(message: &str) -> Self {
        Self::text(StatusCode::TOO_MANY_REQUESTS, message.to_owned())
            .with_header(CACHE_CONTROL, "no-store")
    }

    pub fn payload_too_large() -> Self {
        Self::text(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
    }

    pub fn bad_request() -> Self {
        Self::text(StatusCode::BAD_REQUEST, "bad request")
    }

    pub fn internal_error(message: &str) -> Self {
        Self::text(StatusCode::INTERNAL_SERVER_ERROR, message.to_owned())
    }

    /// Set a header. Invalid values are ignored.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(v) = HeaderValue::from_str(value) {
            self.headers.insert(name, v);
        }
        self
    }

    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
