use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// Request descriptor handed to the dispatcher by the transport layer.
///
/// `target` is the raw request target (path plus optional query string) and
/// is what the response cache keys on. Routing only looks at [`path`].
///
/// [`path`]: GatewayRequest::path
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    /// Peer address as reported by the transport, e.g. `"10.0.0.7:51234"`.
    pub remote_addr: String,
    pub body: Bytes,
}

impl GatewayRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            remote_addr: String::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Target without the query string.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Only GET responses may be cached. A HEAD reply has no body to reuse.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_strips_query() {
        let req = GatewayRequest::get("/users?page=2&sort=asc");
        assert_eq!(req.path(), "/users");
        assert_eq!(req.query(), Some("page=2&sort=asc"));
        assert_eq!(req.target, "/users?page=2&sort=asc");
    }

    #[test]
    fn test_path_without_query() {
        let req = GatewayRequest::get("/health");
        assert_eq!(req.path(), "/health");
        assert_eq!(req.query(), None);
    }

    #[test]
    fn test_only_get_is_cacheable() {
        assert!(GatewayRequest::get("/").is_cacheable());
        assert!(!GatewayRequest::new(Method::HEAD, "/").is_cacheable());
        assert!(!GatewayRequest::post("/").is_cacheable());
        assert!(!GatewayRequest::new(Method::DELETE, "/").is_cacheable());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = GatewayRequest::get("/").with_header("x-real-ip", "10.1.1.1");
        assert_eq!(req.header("X-Real-IP"), Some("10.1.1.1"));
    }
}
