use std::fs;
use std::io::ErrorKind::*;
use std::path::{Path, PathBuf};

use crate::handler::Handler;
use crate::handler::path::clean_path;
use crate::handler::responses;
use crate::http::HttpMethod;
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

/// Serves files below `root`, mapping the request path onto it.
/// Directories are answered with their `index.html`.
pub struct FileServer {
    root: PathBuf,
}

impl FileServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let safe_path = sanitize_path(path);
        let mut full_path = self.root.join(safe_path.trim_start_matches('/'));
        if full_path.is_dir() {
            full_path.push("index.html");
        }
        full_path
    }
}

impl Handler for FileServer {
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest) {
        if !matches!(req.method, HttpMethod::Get | HttpMethod::Head) {
            res.set_header("Allow", "GET, HEAD");
            return responses::error(res, HttpStatus::MethodNotAllowed);
        }

        let full_path = self.resolve(&req.path);
        tracing::debug!(path = %full_path.display(), "serving static file");

        let body = match fs::read(&full_path) {
            Ok(body) => body,
            Err(err) => {
                let status = match err.kind() {
                    NotFound | IsADirectory => HttpStatus::NotFound,
                    PermissionDenied => HttpStatus::Forbidden,
                    _ => {
                        tracing::warn!(%err, path = %full_path.display(), "static file read failed");
                        HttpStatus::InternalServerError
                    }
                };
                return responses::error(res, status);
            }
        };

        res.set_header(ResponseHeader::ContentType, guess_mime(&full_path));
        res.append_body(&body);
    }
}

// Cleaning resolves every ".." lexically, so the result never leaves the root.
fn sanitize_path(path: &str) -> String {
    clean_path(path)
}

fn guess_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("htm") | Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain; charset=utf-8",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
