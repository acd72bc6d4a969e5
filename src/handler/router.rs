//! Pattern based request multiplexer.
//!
//! Patterns name either a fixed path (`/favicon.ico`) or a rooted subtree
//! (`/images/`, trailing slash). A pattern may start with a host name
//! (`api.example.com/v1/`), in which case it only matches requests for that
//! host. Resolution picks the longest matching pattern, host-specific
//! patterns are tried before host-agnostic ones.
//!
//! The registry sits behind a reader-writer lock: every dispatch takes the
//! read side, registration takes the write side, so routes can be added
//! while traffic is flowing.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::handler::path::clean_path;
use crate::handler::{Handler, HandlerFunc, NotFoundHandler, RedirectHandler};
use crate::http::HttpMethod;
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("invalid pattern: empty")]
    EmptyPattern,
    #[error("multiple registrations for {0}")]
    Duplicate(String),
}

#[derive(Clone)]
struct MuxEntry {
    pattern: String,
    exact: bool,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, MuxEntry>,
    // subtree entries, longest pattern first
    subtrees: Vec<MuxEntry>,
    has_hosts: bool,
}

impl Registry {
    /// Longest registered pattern matching `key`. With `hosts_only`, only
    /// host-qualified patterns are candidates.
    ///
    /// A pattern equal to `key` is necessarily the longest candidate, so the
    /// map is consulted first; otherwise the first subtree prefix in
    /// descending length order wins.
    fn lookup(&self, key: &str, hosts_only: bool) -> Option<&MuxEntry> {
        let eligible = |entry: &&MuxEntry| !hosts_only || !entry.pattern.starts_with('/');
        if let Some(entry) = self.entries.get(key).filter(eligible) {
            return Some(entry);
        }
        self.subtrees
            .iter()
            .filter(eligible)
            .find(|entry| key.starts_with(entry.pattern.as_str()))
    }
}

pub struct ServeMux {
    registry: RwLock<Registry>,
    not_found: Arc<dyn Handler>,
}

impl Default for ServeMux {
    fn default() -> Self {
        Self::new()
    }
}

impl ServeMux {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            not_found: Arc::new(NotFoundHandler),
        }
    }

    /// Registers `handler` for `pattern`.
    ///
    /// Fails when the pattern is empty or already registered; the existing
    /// registration is left untouched in that case.
    pub fn handle<H: Handler + 'static>(&self, pattern: &str, handler: H) -> Result<(), RegisterError> {
        self.handle_shared(pattern, Arc::new(handler))
    }

    pub fn handle_func<F>(&self, pattern: &str, f: F) -> Result<(), RegisterError>
    where
        F: Fn(&mut HttpResponse, &HttpRequest) + Send + Sync + 'static,
    {
        self.handle(pattern, HandlerFunc(f))
    }

    /// Registers an already shared handler, e.g. one mounted on several
    /// patterns or another [`ServeMux`].
    pub fn handle_shared(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<(), RegisterError> {
        if pattern.is_empty() {
            return Err(RegisterError::EmptyPattern);
        }

        // Registry mutations below cannot leave it half-updated, so a
        // poisoned lock is still consistent.
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.entries.contains_key(pattern) {
            return Err(RegisterError::Duplicate(pattern.to_string()));
        }

        let entry = MuxEntry {
            pattern: pattern.to_string(),
            exact: !pattern.ends_with('/'),
            handler,
        };

        if !entry.exact {
            let pos = registry
                .subtrees
                .iter()
                .position(|e| e.pattern.len() < entry.pattern.len())
                .unwrap_or(registry.subtrees.len());
            registry.subtrees.insert(pos, entry.clone());
        }
        if !pattern.starts_with('/') {
            registry.has_hosts = true;
        }
        registry.entries.insert(entry.pattern.clone(), entry);

        tracing::debug!(pattern, "registered route");
        Ok(())
    }

    /// Resolves `host` and `path` to a handler and the pattern that matched.
    ///
    /// Host-qualified patterns are tried first (`host + path` as the key)
    /// when any are registered. Unmatched requests get the not-found
    /// handler and an empty pattern.
    pub fn resolve(&self, host: &str, path: &str) -> (Arc<dyn Handler>, String) {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);

        let mut found = None;
        if registry.has_hosts {
            found = registry.lookup(&format!("{}{}", host, path), true);
        }
        if found.is_none() {
            found = registry.lookup(path, false);
        }

        match found {
            Some(entry) => (entry.handler.clone(), entry.pattern.clone()),
            None => (self.not_found.clone(), String::new()),
        }
    }

    /// The handler [`ServeMux::serve`] would use for `req`, and its pattern.
    ///
    /// A `*` request-target gets a 400 that closes the connection, with an
    /// empty pattern. Paths that are not in canonical form yield a permanent
    /// redirect to the cleaned path; the pattern is then the one the cleaned
    /// path resolves to. CONNECT requests are routed on their raw host and path.
    pub fn handler(&self, req: &HttpRequest) -> (Arc<dyn Handler>, String) {
        if req.uri == "*" {
            return (Arc::new(AsteriskHandler), String::new());
        }
        if req.method == HttpMethod::Connect {
            return self.resolve(&req.host, &req.path);
        }

        let host = strip_host_port(&req.host);
        let path = clean_path(&req.path);
        if path != req.path {
            let (_, pattern) = self.resolve(host, &path);
            let mut target = path;
            if let Some(query) = &req.query {
                target.push('?');
                target.push_str(query);
            }
            let redirect: Arc<dyn Handler> =
                Arc::new(RedirectHandler::new(target, HttpStatus::MovedPermanently));
            return (redirect, pattern);
        }

        self.resolve(host, &req.path)
    }

    /// Registered patterns, in no particular order.
    pub fn patterns(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.entries.keys().cloned().collect()
    }
}

impl Handler for ServeMux {
    fn serve(&self, res: &mut HttpResponse, req: &HttpRequest) {
        let (handler, pattern) = self.handler(req);
        tracing::debug!(method = %req.method, path = %req.path, pattern = %pattern, "dispatch");
        handler.serve(res, req);
    }
}

/// Answers `*` request-targets, which name no resource a mux can route.
struct AsteriskHandler;

impl Handler for AsteriskHandler {
    fn serve(&self, res: &mut HttpResponse, _req: &HttpRequest) {
        res.set_header(ResponseHeader::Connection, "close");
        res.set_status(HttpStatus::BadRequest);
    }
}

/// Drops a `:port` suffix from a Host value, unwrapping bracketed IPv6.
fn strip_host_port(host: &str) -> &str {
    if !host.contains(':') {
        return host;
    }
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((addr, tail)) if tail.is_empty() || tail.starts_with(':') => addr,
            _ => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}
