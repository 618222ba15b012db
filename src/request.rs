//! Incoming HTTP request type.

use bytes::Bytes;
use http::Method;

use crate::context::RequestContext;

/// One header line. The value is `None` for a header sent without value.
pub type Header = (String, Option<String>);

/// An incoming HTTP request with a fully buffered body.
///
/// Cloning is cheap: the body is reference-counted and clones share the
/// same [`RequestContext`].
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: String,
    headers: Vec<Header>,
    body: Bytes,
    context: RequestContext,
}

impl Request {
    /// A request with no headers, an empty body and a fresh context.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            context: RequestContext::new(),
        }
    }

    /// Request as received by the server. hyper groups repeated header
    /// names, so the order across different names is lost; values of one
    /// name keep their order.
    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let headers = parts.headers.iter()
            .map(|(name, value)| {
                (name.as_str().to_owned(), Some(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            })
            .collect();
        let uri = parts.uri.path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());
        Self { method: parts.method, uri, headers, body, context: RequestContext::new() }
    }

    /// Appends a header. Repeated names are kept in order.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), Some(value.into())));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &str { &self.uri }
    /// Headers in insertion order. For requests received by [`Server`](crate::Server)
    /// repeated names are grouped together.
    pub fn headers(&self) -> &[Header] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn context(&self) -> &RequestContext { &self.context }

    /// Path component of the URI, without the query string.
    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(self.uri.as_str(), |(path, _)| path)
    }

    /// Case-insensitive header lookup. Returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// The `content-length` header, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }
}

pub(crate) fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_headers_are_grouped_by_name() {
        let (parts, ()) = http::Request::builder()
            .method(Method::POST)
            .uri("/orders?page=2")
            .header("x-a", "1")
            .header("x-b", "2")
            .header("x-a", "3")
            .body(())
            .unwrap()
            .into_parts();

        let req = Request::from_parts(parts, Bytes::from_static(b"{}"));

        let names: Vec<_> = req.headers().iter().map(|(k, _)| k.as_str()).collect();
        let a_pos: Vec<_> = names.iter()
            .enumerate()
            .filter(|(_, n)| **n == "x-a")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(names.len(), 3);
        assert_eq!(a_pos[1], a_pos[0] + 1);
        let a_values: Vec<_> = req.headers().iter()
            .filter(|(k, _)| k == "x-a")
            .filter_map(|(_, v)| v.as_deref())
            .collect();
        assert_eq!(a_values, ["1", "3"]);
        assert_eq!(req.uri(), "/orders?page=2");
        assert_eq!(req.body(), b"{}");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::new(Method::GET, "/")
            .with_header("Content-Type", "application/json")
            .with_header("X-Id", "1");

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.content_type(), Some("application/json"));
        assert_eq!(req.header("x-ID"), Some("1"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn path_strips_query() {
        let req = Request::new(Method::GET, "/users/42?expand=true");
        assert_eq!(req.path(), "/users/42");
        assert_eq!(req.uri(), "/users/42?expand=true");
    }

    #[test]
    fn from_parts_keeps_header_order_and_query() {
        let (parts, ()) = http::Request::builder()
            .method(Method::POST)
            .uri("http://example.com/items?limit=5")
            .header("x-a", "1")
            .header("x-b", "2")
            .header("x-a", "3")
            .body(())
            .unwrap()
            .into_parts();

        let req = Request::from_parts(parts, Bytes::from_static(b"{}"));

        assert_eq!(req.uri(), "/items?limit=5");
        let names: Vec<&str> = req.headers().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["x-a", "x-a", "x-b"]);
        assert_eq!(req.body(), b"{}");
    }
}
