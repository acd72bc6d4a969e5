//! The response sink handed to handlers, and its wire encoder.
//!
//! Handlers only ever set the status, set headers and append body bytes.
//! Framing headers (`Content-Length`, `Date`, `Server`) are filled in by
//! [`HttpResponse::encode`] when the connection task writes the response.

use std::time::SystemTime;

use crate::http::HttpVersion;
use crate::http::headers::HttpHeaders;
use crate::http::status::HttpStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseHeader {
    ContentLength,
    ContentType,
    ContentEncoding,
    Connection,
    Date,
    Location,
    Server,
    Vary,
}

impl AsRef<str> for ResponseHeader {
    fn as_ref(&self) -> &str {
        match self {
            ResponseHeader::ContentType => "Content-Type",
            ResponseHeader::ContentLength => "Content-Length",
            ResponseHeader::ContentEncoding => "Content-Encoding",
            ResponseHeader::Connection => "Connection",
            ResponseHeader::Date => "Date",
            ResponseHeader::Location => "Location",
            ResponseHeader::Server => "Server",
            ResponseHeader::Vary => "Vary",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: HttpStatus,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: HttpStatus::Ok,
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    pub fn set_status(&mut self, status: HttpStatus) {
        self.status = status;
    }

    /// Sets a header, replacing any earlier value with the same name.
    /// Accepts either a [`ResponseHeader`] or an arbitrary name.
    pub fn set_header<N: AsRef<str>>(&mut self, name: N, value: &str) {
        self.headers.set_raw(name.as_ref(), value);
    }

    pub fn header<N: AsRef<str>>(&self, name: N) -> Option<&str> {
        self.headers.get(name.as_ref())
    }

    pub fn append_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// True once a handler asked for the connection to be torn down.
    pub fn closes_connection(&self) -> bool {
        self.headers
            .has_token(ResponseHeader::Connection.as_ref(), "close")
    }

    /// Serializes the status line, headers and (unless `head_only`) body.
    ///
    /// `Date` and `Server` are added when the handler did not set them, and
    /// `Content-Length` always reflects the body actually accumulated.
    pub fn encode(&self, version: HttpVersion, server_name: &str, head_only: bool) -> Vec<u8> {
        let mut headers = self.headers.clone();
        if !headers.contains(ResponseHeader::Date.as_ref()) {
            headers.set_raw(
                ResponseHeader::Date.as_ref(),
                &httpdate::fmt_http_date(SystemTime::now()),
            );
        }
        if !server_name.is_empty() && !headers.contains(ResponseHeader::Server.as_ref()) {
            headers.set_raw(ResponseHeader::Server.as_ref(), server_name);
        }

        let with_body = self.status.allows_body();
        if with_body {
            headers.set_raw(
                ResponseHeader::ContentLength.as_ref(),
                &self.body.len().to_string(),
            );
        } else {
            headers.remove(ResponseHeader::ContentLength.as_ref());
        }

        // HTTP/<major>.<minor> <status> <reason>\r\n
        // <header_name>: <header_value>\r\n
        // ...
        // \r\n
        let version = match version {
            HttpVersion::V1_0 => HttpVersion::V1_0,
            _ => HttpVersion::V1_1,
        };
        let head = format!(
            "{} {} {}\r\n{}\r\n",
            version,
            self.status.code(),
            self.status.reason(),
            headers.stringify(),
        );

        let mut out = head.into_bytes();
        if with_body && !head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}
