//! Request handlers.
//!
//! Everything that produces a response implements [`Handler`]: plain
//! closures through [`HandlerFunc`], the built-in [`NotFoundHandler`] and
//! [`RedirectHandler`], wrappers such as [`StripPrefix`] and
//! [`Compress`], and the [`ServeMux`] router itself, so routers nest.

mod middleware;
mod path;
mod responses;
mod router;
mod static_files;

use std::sync::Arc;

use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

pub use middleware::{Compress, CompressionAlgorithm};
pub use path::clean_path;
pub use responses::{error, html_escape, welcome};
pub use router::{RegisterError, ServeMux};
pub use static_files::FileServer;

/// Produces a response for one request.
///
/// Handlers run on a blocking-capable thread owned by the connection task,
/// so they may block freely. A panic aborts only the connection that
/// triggered it.
pub trait Handler: Send + Sync {
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest);
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest) {
        (**self).serve(res, req)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest) {
        (**self).serve(res, req)
    }
}

/// Adapts a plain function or closure into a [`Handler`].
pub struct HandlerFunc<F>(pub F);

impl<F> Handler for HandlerFunc<F>
where
    F: Fn(&mut HttpResponse, &HttpRequest) + Send + Sync,
{
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest) {
        (self.0)(res, req)
    }
}

/// Answers every request with `404 Not Found`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundHandler;

impl Handler for NotFoundHandler {
    fn serve(&self, res: &mut HttpResponse, _req: &HttpRequest) {
        responses::not_found(res);
    }
}

/// Redirects every request to a fixed target with the given status.
#[derive(Debug, Clone)]
pub struct RedirectHandler {
    target: String,
    status: HttpStatus,
}

impl RedirectHandler {
    pub fn new(target: impl Into<String>, status: HttpStatus) -> Self {
        Self {
            target: target.into(),
            status,
        }
    }
}

impl Handler for RedirectHandler {
    fn serve(&self, res: &mut HttpResponse, _req: &HttpRequest) {
        responses::redirect(res, &self.target, self.status);
    }
}

/// Removes `prefix` from the request path before handing the request to
/// the wrapped handler. Requests outside the prefix get a 404.
pub struct StripPrefix<H> {
    prefix: String,
    inner: H,
}

impl<H: Handler> StripPrefix<H> {
    pub fn new(prefix: impl Into<String>, inner: H) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }
}

impl<H: Handler> Handler for StripPrefix<H> {
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest) {
        match req.path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => {
                let mut inner_req = req.clone();
                inner_req.path = rest.to_string();
                self.inner.serve(res, &inner_req);
            }
            None => responses::not_found(res),
        }
    }
}

/// Convenience for handlers that only need to set a plain text body.
pub fn text(res: &mut HttpResponse, status: HttpStatus, body: &str) {
    res.set_status(status);
    res.set_header(ResponseHeader::ContentType, "text/plain; charset=utf-8");
    res.append_body(body.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(res: &HttpResponse) -> String {
        String::from_utf8_lossy(&res.body).into_owned()
    }

    #[test]
    fn closures_become_handlers() {
        let h = HandlerFunc(|res: &mut HttpResponse, req: &HttpRequest| {
            text(res, HttpStatus::Ok, &format!("hi from {}", req.path));
        });
        let mut res = HttpResponse::new();
        h.serve(&mut res, &HttpRequest::get("", "/greet"));
        assert_eq!(body(&res), "hi from /greet");
        assert_eq!(
            res.header(ResponseHeader::ContentType),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn not_found_ignores_request() {
        let mut res = HttpResponse::new();
        NotFoundHandler.serve(&mut res, &HttpRequest::get("x", "/anything"));
        assert_eq!(res.status, HttpStatus::NotFound);
        assert!(body(&res).contains("404"));
    }

    #[test]
    fn redirect_sets_location_and_code() {
        let h = RedirectHandler::new("/new?a=<b>", HttpStatus::Found);
        let mut res = HttpResponse::new();
        h.serve(&mut res, &HttpRequest::get("", "/old"));
        assert_eq!(res.status, HttpStatus::Found);
        assert_eq!(res.header(ResponseHeader::Location), Some("/new?a=<b>"));
        assert!(body(&res).contains("/new?a=&lt;b&gt;"));
    }

    #[test]
    fn strip_prefix_rewrites_path_only() {
        let inner = HandlerFunc(|res: &mut HttpResponse, req: &HttpRequest| {
            res.append_body(format!("{}|{}", req.path, req.uri).as_bytes());
        });
        let h = StripPrefix::new("/static", inner);

        let mut res = HttpResponse::new();
        h.serve(&mut res, &HttpRequest::get("", "/static/css/site.css"));
        assert_eq!(body(&res), "/css/site.css|/static/css/site.css");

        let mut res = HttpResponse::new();
        h.serve(&mut res, &HttpRequest::get("", "/other"));
        assert_eq!(res.status, HttpStatus::NotFound);
    }

    #[test]
    fn shared_handlers_delegate() {
        let shared: Arc<dyn Handler> = Arc::new(NotFoundHandler);
        let boxed: Box<dyn Handler> = Box::new(shared.clone());
        let mut res = HttpResponse::new();
        boxed.serve(&mut res, &HttpRequest::get("", "/"));
        assert_eq!(res.status, HttpStatus::NotFound);
    }
}
