use thiserror::Error;

use crate::http::parser::RequestLimits;
use crate::http::request::{HttpRequest, RequestHeader};
use crate::http::{HttpMethod, HttpVersion};

/// Header-level rules applied once the request head is parsed, before any
/// body byte is read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidatorError {
    #[error("HTTP version {0} not supported")]
    HttpVersionNotSupported(HttpVersion),
    #[error("missing required Host header")]
    MissingHost,
    #[error("invalid Host {0:?}")]
    InvalidHost(String),
    #[error("malformed Content-Length")]
    MalformedContentLength,
    #[error("body of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),
    #[error("unsupported Transfer-Encoding")]
    UnsupportedTransferEncoding,
    #[error("CONNECT requires an authority-form target")]
    ConnectWithoutAuthority,
}

pub struct Validator;

impl Validator {
    fn validate_http_version(v: HttpVersion, max: HttpVersion) -> Result<(), ValidatorError> {
        if v < HttpVersion::V1_0 || v > max || v > HttpVersion::V1_1 {
            return Err(ValidatorError::HttpVersionNotSupported(v));
        }
        Ok(())
    }

    fn validate_content_length(
        req: &HttpRequest,
        limits: &RequestLimits,
    ) -> Result<(), ValidatorError> {
        let raw = match req.headers.get(RequestHeader::ContentLength.as_str()) {
            Some(raw) => raw,
            None => return Ok(()),
        };
        let len = raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ValidatorError::MalformedContentLength)?;
        if len > limits.max_body_size {
            return Err(ValidatorError::PayloadTooLarge(len));
        }
        Ok(())
    }

    pub fn validate_request(
        req: &HttpRequest,
        limits: &RequestLimits,
    ) -> Result<(), ValidatorError> {
        Self::validate_http_version(req.http_version, limits.max_version)?;

        if req.http_version == HttpVersion::V1_1 && req.host.is_empty() {
            return Err(ValidatorError::MissingHost);
        }
        if !req.host.is_empty() && !is_valid_host(&req.host) {
            return Err(ValidatorError::InvalidHost(req.host.clone()));
        }

        if req.headers.contains(RequestHeader::TransferEncoding.as_str()) {
            return Err(ValidatorError::UnsupportedTransferEncoding);
        }

        if req.method == HttpMethod::Connect && req.path.starts_with('/') {
            return Err(ValidatorError::ConnectWithoutAuthority);
        }

        Self::validate_content_length(req, limits)
    }
}

/// A reg-name or bracketed IP literal, optionally followed by `:port`.
fn is_valid_host(host: &str) -> bool {
    let (name_ok, port) = match host.strip_prefix('[') {
        Some(rest) => {
            let (addr, tail) = match rest.split_once(']') {
                Some(parts) => parts,
                None => return false,
            };
            let port = match tail {
                "" => None,
                _ => match tail.strip_prefix(':') {
                    Some(port) => Some(port),
                    None => return false,
                },
            };
            let addr_ok = !addr.is_empty()
                && addr.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.');
            (addr_ok, port)
        }
        None => {
            let (name, port) = match host.split_once(':') {
                Some((name, port)) => (name, Some(port)),
                None => (host, None),
            };
            (!name.is_empty() && name.chars().all(is_reg_name_char), port)
        }
    };
    name_ok && port.is_none_or(|p| p.chars().all(|c| c.is_ascii_digit()))
}

fn is_reg_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~!$&'()*+,;=%".contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RequestLimits {
        RequestLimits {
            max_uri_size: 1024,
            max_header_size: 8192,
            max_body_size: 16,
            max_version: HttpVersion::V1_1,
        }
    }

    #[test]
    fn accepts_plain_get() {
        let req = HttpRequest::get("localhost", "/");
        assert_eq!(Validator::validate_request(&req, &limits()), Ok(()));
    }

    #[test]
    fn http11_requires_host() {
        let req = HttpRequest::get("", "/");
        assert_eq!(
            Validator::validate_request(&req, &limits()),
            Err(ValidatorError::MissingHost)
        );

        let mut old = HttpRequest::get("", "/");
        old.http_version = HttpVersion::V1_0;
        assert_eq!(Validator::validate_request(&old, &limits()), Ok(()));
    }

    #[test]
    fn host_must_be_a_name_or_address() {
        for host in ["example.com", "example.com:8080", "127.0.0.1:80", "[::1]", "[::1]:8080", "my_host"] {
            let req = HttpRequest::get(host, "/");
            assert_eq!(Validator::validate_request(&req, &limits()), Ok(()), "host {:?}", host);
        }

        for host in ["/admin", "a/b", "bad host", "tab\there", "x:80a", "[::1", "[::1]x", ":80", "a\u{7f}"] {
            let req = HttpRequest::get(host, "/");
            assert_eq!(
                Validator::validate_request(&req, &limits()),
                Err(ValidatorError::InvalidHost(host.to_string())),
                "host {:?}",
                host
            );
        }
    }

    #[test]
    fn body_limits() {
        let mut req = HttpRequest::get("localhost", "/");
        req.set_header(RequestHeader::ContentLength, "17");
        assert_eq!(
            Validator::validate_request(&req, &limits()),
            Err(ValidatorError::PayloadTooLarge(17))
        );

        req.set_header(RequestHeader::ContentLength, "ten");
        assert_eq!(
            Validator::validate_request(&req, &limits()),
            Err(ValidatorError::MalformedContentLength)
        );
    }

    #[test]
    fn version_capped_by_limits() {
        let mut l = limits();
        l.max_version = HttpVersion::V1_0;
        let req = HttpRequest::get("localhost", "/");
        assert_eq!(
            Validator::validate_request(&req, &l),
            Err(ValidatorError::HttpVersionNotSupported(HttpVersion::V1_1))
        );
    }
}
