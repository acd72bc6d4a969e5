use crate::http::headers::HttpHeaders;
use crate::http::{HttpMethod, HttpVersion};

/// Common HTTP request headers
/// This enum defines the set of headers that can be explicitly set on an
/// [`HttpRequest`] through its safe wrapper API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestHeader {
    Host,
    ContentLength,
    ContentType,
    Connection,
    AcceptEncoding,
    TransferEncoding,
}

impl RequestHeader {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestHeader::Host => "Host",
            RequestHeader::ContentLength => "Content-Length",
            RequestHeader::ContentType => "Content-Type",
            RequestHeader::Connection => "Connection",
            RequestHeader::AcceptEncoding => "Accept-Encoding",
            RequestHeader::TransferEncoding => "Transfer-Encoding",
        }
    }
}

/// A parsed request, handed to handlers as an immutable descriptor.
///
/// `uri` is the request-target exactly as received on the request line.
/// `path` and `query` are split out of it, and `host` comes from an
/// absolute-form target or, failing that, the `Host` header.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub path: String,
    pub query: Option<String>,
    pub host: String,
    pub http_version: HttpVersion,

    // headers
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            method: HttpMethod::Unknown,
            uri: String::new(),
            path: String::new(),
            query: None,
            host: String::new(),
            http_version: HttpVersion::V1_1,
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    /// Builds a bodiless request for `target`, splitting path and query the
    /// same way the parser does. Mostly useful to drive handlers directly.
    pub fn get(host: &str, target: &str) -> Self {
        let mut req = Self::new();
        req.method = HttpMethod::Get;
        req.set_target(target);
        req.host = host.to_string();
        if !host.is_empty() {
            req.set_header(RequestHeader::Host, host);
        }
        req
    }

    /// Records the raw request-target and derives `path` / `query` from it.
    pub fn set_target(&mut self, target: &str) {
        self.uri = target.to_string();
        match target.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                self.query = Some(query.to_string());
            }
            None => {
                self.path = target.to_string();
                self.query = None;
            }
        }
    }

    /// Sets a request header constrained to the allowed [`RequestHeader`] variants.
    ///
    /// This method acts as a safe wrapper around [`HttpHeaders::set_raw`],
    /// ensuring that only headers explicitly supported by [`RequestHeader`]
    /// can be added through this API.
    ///
    /// No validation is performed on the header value itself.
    pub fn set_header(&mut self, h: RequestHeader, value: &str) {
        self.headers.set_raw(h.as_str(), value);
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get(RequestHeader::ContentLength.as_str())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Whether the client asked for the connection to stay open after this
    /// exchange. HTTP/1.1 persists by default, HTTP/1.0 only on request.
    pub fn wants_keep_alive(&self) -> bool {
        let conn = RequestHeader::Connection.as_str();
        match self.http_version {
            HttpVersion::V1_1 => !self.headers.has_token(conn, "close"),
            HttpVersion::V1_0 => self.headers.has_token(conn, "keep-alive"),
            _ => false,
        }
    }

    pub fn accepts_encoding(&self, encoding: &str) -> bool {
        self.headers
            .get(RequestHeader::AcceptEncoding.as_str())
            .map(|v| {
                v.split(',').any(|item| {
                    let mut parts = item.split(';');
                    let name = parts.next().unwrap_or("").trim();
                    let refused = parts.any(|p| {
                        p.trim()
                            .strip_prefix("q=")
                            .and_then(|q| q.parse::<f32>().ok())
                            .is_some_and(|q| q == 0.0)
                    });
                    name.eq_ignore_ascii_case(encoding) && !refused
                })
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_splits_path_and_query() {
        let req = HttpRequest::get("example.com", "/search?q=rust&page=2");
        assert_eq!(req.uri, "/search?q=rust&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query.as_deref(), Some("q=rust&page=2"));
        assert_eq!(req.headers.get("host"), Some("example.com"));
    }

    #[test]
    fn keep_alive_defaults_follow_version() {
        let mut req = HttpRequest::get("", "/");
        assert!(req.wants_keep_alive());

        req.set_header(RequestHeader::Connection, "close");
        assert!(!req.wants_keep_alive());

        let mut old = HttpRequest::get("", "/");
        old.http_version = HttpVersion::V1_0;
        assert!(!old.wants_keep_alive());
        old.set_header(RequestHeader::Connection, "Keep-Alive");
        assert!(old.wants_keep_alive());
    }

    #[test]
    fn accept_encoding_honours_zero_quality() {
        let mut req = HttpRequest::get("", "/");
        req.set_header(RequestHeader::AcceptEncoding, "deflate, gzip;q=0");
        assert!(req.accepts_encoding("deflate"));
        assert!(!req.accepts_encoding("gzip"));
        assert!(!req.accepts_encoding("br"));
    }
}
