//! Incremental HTTP/1.x request parser.
//!
//! Bytes are fed as they arrive from the connection; [`RequestParser::parse`]
//! returns `Ok(None)` until a whole request (head plus `Content-Length`
//! body) is buffered. Bytes past the end of one request stay buffered for
//! the next one, so a single parser serves a whole keep-alive connection.

use thiserror::Error;

use crate::config::ServerConfig;
use crate::http::request::*;
use crate::http::validator::{Validator, ValidatorError};
use crate::http::*;

const HTTP_METHOD_MAX_LEN: usize = 16;

/// Size limits enforced while parsing.
#[derive(Debug, Clone)]
pub struct RequestLimits {
    pub max_uri_size: usize,
    pub max_header_size: usize,
    pub max_body_size: usize,
    pub max_version: HttpVersion,
}

impl From<&ServerConfig> for RequestLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_uri_size: config.max_uri_size,
            max_header_size: config.max_header_size,
            max_body_size: config.max_body_size,
            max_version: config.http_version,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request line")]
    RequestLine,
    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),
    #[error("invalid request target {0:?}")]
    InvalidTarget(String),
    #[error("request target too long")]
    UriTooLong,
    #[error("malformed HTTP version {0:?}")]
    Version(String),
    #[error("request head too large")]
    HeadersTooLarge,
    #[error("malformed header line")]
    MalformedHeader,
    #[error("duplicate {0} header")]
    DuplicateHeader(&'static str),
    #[error(transparent)]
    Invalid(#[from] ValidatorError),
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum RequestParserState {
    RequestLine,
    Headers,
    Body,
}

pub struct RequestParser {
    buf: Vec<u8>,
    state: RequestParserState,
    req: HttpRequest,
    content_length: usize,
    limits: RequestLimits,
}

impl RequestParser {
    pub fn new(limits: RequestLimits) -> Self {
        Self {
            buf: Vec::new(),
            state: RequestParserState::RequestLine,
            req: HttpRequest::new(),
            content_length: 0,
            limits,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// True while no byte of the next request has been consumed.
    pub fn is_idle(&self) -> bool {
        self.state == RequestParserState::RequestLine && self.buf.is_empty()
    }

    /// Advances through whatever is buffered. Returns the request once it
    /// is complete and resets for the next one.
    pub fn parse(&mut self) -> Result<Option<HttpRequest>, ParseError> {
        loop {
            match self.state {
                RequestParserState::RequestLine => {
                    if !self.parse_request_line()? {
                        return Ok(None);
                    }
                }
                RequestParserState::Headers => {
                    if !self.parse_headers()? {
                        return Ok(None);
                    }
                }
                RequestParserState::Body => {
                    if self.buf.len() < self.content_length {
                        return Ok(None);
                    }
                    let body: Vec<u8> = self.buf.drain(..self.content_length).collect();
                    self.state = RequestParserState::RequestLine;
                    self.content_length = 0;
                    let mut req = std::mem::take(&mut self.req);
                    req.body = body;
                    return Ok(Some(req));
                }
            }
        }
    }

    fn parse_request_line(&mut self) -> Result<bool, ParseError> {
        // Clients may send stray CRLFs between requests
        while self.buf.starts_with(b"\r\n") {
            self.buf.drain(..2);
        }

        let line_end = match find(&self.buf, b"\r\n") {
            Some(i) => i,
            None => {
                if self.buf.len() > self.limits.max_uri_size + HTTP_METHOD_MAX_LEN + 16 {
                    return Err(ParseError::UriTooLong);
                }
                return Ok(false);
            }
        };

        // Request line: METHOD TARGET HTTP/VERSION
        let line = std::str::from_utf8(&self.buf[..line_end]).map_err(|_| ParseError::RequestLine)?;
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() != 3 {
            return Err(ParseError::RequestLine);
        }

        if parts[0].len() > HTTP_METHOD_MAX_LEN {
            return Err(ParseError::UnsupportedMethod(parts[0].to_string()));
        }
        let method = match http_method_from_str(parts[0]) {
            HttpMethod::Unknown => return Err(ParseError::UnsupportedMethod(parts[0].to_string())),
            m => m,
        };

        let target = parts[1];
        if target.len() > self.limits.max_uri_size {
            return Err(ParseError::UriTooLong);
        }

        let version = parts[2]
            .strip_prefix("HTTP/")
            .and_then(|v| v.split_once('.'))
            .and_then(|(maj, min)| Some((maj.parse::<u8>().ok()?, min.parse::<u8>().ok()?)))
            .and_then(HttpVersion::from_pair)
            .ok_or_else(|| ParseError::Version(parts[2].to_string()))?;

        let mut req = HttpRequest::new();
        req.method = method;
        req.http_version = version;
        apply_target(&mut req, target)?;

        self.req = req;
        self.state = RequestParserState::Headers;
        self.buf.drain(..line_end + 2);
        Ok(true)
    }

    fn parse_headers(&mut self) -> Result<bool, ParseError> {
        // Look for end of headers; an empty block is just the final CRLF
        let (block_end, consumed) = if self.buf.starts_with(b"\r\n") {
            (0, 2)
        } else {
            match find(&self.buf, b"\r\n\r\n") {
                Some(i) => (i, i + 4),
                None => {
                    if self.buf.len() > self.limits.max_header_size {
                        return Err(ParseError::HeadersTooLarge);
                    }
                    return Ok(false);
                }
            }
        };

        if block_end > self.limits.max_header_size {
            return Err(ParseError::HeadersTooLarge);
        }

        let block = std::str::from_utf8(&self.buf[..block_end]).map_err(|_| ParseError::MalformedHeader)?;
        for line in block.split("\r\n").filter(|l| !l.is_empty()) {
            // obs-fold continuation lines are rejected
            if line.starts_with(' ') || line.starts_with('\t') {
                return Err(ParseError::MalformedHeader);
            }
            let (name, value) = line.split_once(':').ok_or(ParseError::MalformedHeader)?;
            if name.is_empty() || name.contains(|c: char| c.is_ascii_whitespace()) {
                return Err(ParseError::MalformedHeader);
            }
            let value = value.trim();

            match self.req.headers.get(name) {
                Some(_) if name.eq_ignore_ascii_case(RequestHeader::Host.as_str()) => {
                    return Err(ParseError::DuplicateHeader("Host"));
                }
                Some(prev) if name.eq_ignore_ascii_case(RequestHeader::ContentLength.as_str()) => {
                    if prev != value {
                        return Err(ParseError::DuplicateHeader("Content-Length"));
                    }
                }
                Some(prev) => {
                    let joined = format!("{}, {}", prev, value);
                    self.req.headers.set_raw(name, &joined);
                }
                None => self.req.headers.set_raw(name, value),
            }
        }

        if self.req.host.is_empty() {
            if let Some(host) = self.req.headers.get(RequestHeader::Host.as_str()) {
                self.req.host = host.to_string();
            }
        }

        // Validate the request early, before reading the body.
        Validator::validate_request(&self.req, &self.limits)?;

        self.content_length = self.req.content_length().unwrap_or(0);
        self.state = RequestParserState::Body;
        self.buf.drain(..consumed);
        Ok(true)
    }
}

/// Fills `uri`, `path`, `query` and, for absolute-form targets, `host`.
fn apply_target(req: &mut HttpRequest, target: &str) -> Result<(), ParseError> {
    if target == "*" || target.starts_with('/') {
        req.set_target(target);
        return Ok(());
    }

    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"));
    if let Some(rest) = rest {
        let split = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(split);
        if authority.is_empty() {
            return Err(ParseError::InvalidTarget(target.to_string()));
        }
        let tail = if tail.starts_with('?') {
            format!("/{}", tail)
        } else if tail.is_empty() {
            "/".to_string()
        } else {
            tail.to_string()
        };
        req.set_target(&tail);
        req.uri = target.to_string();
        req.host = authority.to_string();
        return Ok(());
    }

    // authority-form, only meaningful for CONNECT
    if req.method == HttpMethod::Connect && !target.is_empty() && !target.contains('/') {
        req.uri = target.to_string();
        req.host = target.to_string();
        req.path = String::new();
        return Ok(());
    }

    Err(ParseError::InvalidTarget(target.to_string()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
