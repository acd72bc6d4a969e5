use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use std::io::Write;
use thiserror::Error;

use crate::handler::Handler;
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};

// Content codings this server can produce, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    Gzip,
    Deflate,
}

impl CompressionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Deflate => "deflate",
        }
    }

    fn negotiate(req: &HttpRequest) -> Option<Self> {
        [CompressionAlgorithm::Gzip, CompressionAlgorithm::Deflate]
            .into_iter()
            .find(|algo| req.accepts_encoding(algo.as_str()))
    }
}

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("compression I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compresses the wrapped handler's response body when the client accepts
/// gzip or deflate. Small or already encoded bodies are left alone.
pub struct Compress<H> {
    inner: H,
    min_size: usize,
}

impl<H: Handler> Compress<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            min_size: 256,
        }
    }

    /// Bodies shorter than `min_size` bytes are sent uncompressed.
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }
}

impl<H: Handler> Handler for Compress<H> {
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest) {
        self.inner.serve(res, req);

        if res.body.len() < self.min_size
            || !res.status.allows_body()
            || res.header(ResponseHeader::ContentEncoding).is_some()
        {
            return;
        }
        let algo = match CompressionAlgorithm::negotiate(req) {
            Some(algo) => algo,
            None => return,
        };

        match compress_body(res, algo) {
            Ok(()) => res.set_header(ResponseHeader::Vary, "Accept-Encoding"),
            Err(err) => tracing::warn!(%err, "leaving response uncompressed"),
        }
    }
}

fn compress_body(res: &mut HttpResponse, algo: CompressionAlgorithm) -> Result<(), CompressionError> {
    match algo {
        CompressionAlgorithm::Gzip => {
            let mut e = GzEncoder::new(Vec::new(), Compression::default());
            e.write_all(&res.body)?;
            res.body = e.finish()?;
        }
        CompressionAlgorithm::Deflate => {
            let mut e = DeflateEncoder::new(Vec::new(), Compression::default());
            e.write_all(&res.body)?;
            res.body = e.finish()?;
        }
    }

    res.set_header(ResponseHeader::ContentEncoding, algo.as_str());
    Ok(())
}
