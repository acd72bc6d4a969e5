//! Canned response bodies shared by the built-in handlers.

use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

fn html(res: &mut HttpResponse, status: HttpStatus, body: &str) {
    res.set_status(status);
    res.set_header(ResponseHeader::ContentType, "text/html; charset=utf-8");
    res.append_body(body.as_bytes());
}

pub fn welcome(res: &mut HttpResponse, server_name: &str) {
    let body = format!("<h1>Welcome to {}!</h1>", html_escape(server_name));
    html(res, HttpStatus::Ok, &body);
}

pub fn not_found(res: &mut HttpResponse) {
    error(res, HttpStatus::NotFound);
}

pub fn redirect(res: &mut HttpResponse, target: &str, status: HttpStatus) {
    res.set_header(ResponseHeader::Location, target);
    let body = format!(
        "<a href=\"{}\">{}</a>.\n",
        html_escape(target),
        status.reason()
    );
    html(res, status, &body);
}

/// Writes a minimal `<h1>code reason</h1>` page for `status`.
pub fn error(res: &mut HttpResponse, status: HttpStatus) {
    let body = format!("<h1>{} {}</h1>", status.code(), status.reason());
    html(res, status, &body);
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_pages_carry_status_line() {
        let mut res = HttpResponse::new();
        error(&mut res, HttpStatus::Forbidden);
        assert_eq!(res.status, HttpStatus::Forbidden);
        assert_eq!(res.body, b"<h1>403 Forbidden</h1>");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&#34;x&#34;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
