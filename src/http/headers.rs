//! HTTP headers abstraction for [`HttpRequest`](crate::http::request::HttpRequest) and
//! [`HttpResponse`](crate::http::response::HttpResponse)
//!
//! Headers are stored in an ordered map to preserve insertion order.
//! Lookups and replacement are case-insensitive, the name is kept as it
//! was first written so serialization reproduces the caller's casing.
//!
//! This abstraction does not enforce any HTTP semantics or constraints.
//! Higher-level types such as [`HttpRequest`](crate::http::request::HttpRequest)
//! and [`HttpResponse`](crate::http::response::HttpResponse) are responsible for
//! applying their own rules by wrapping or constraining access to this structure.

use indexmap::IndexMap;
use indexmap::map::Entry;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpHeaders {
    // lowercased name -> (name as written, value)
    headers: IndexMap<String, (String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self {
            headers: IndexMap::new(),
        }
    }

    /// Sets `name` to `value`, replacing any previous value for the same
    /// name regardless of case.
    pub fn set_raw(&mut self, name: &str, value: &str) {
        match self.headers.entry(name.to_ascii_lowercase()) {
            Entry::Occupied(mut e) => e.get_mut().1 = value.to_string(),
            Entry::Vacant(e) => {
                e.insert((name.to_string(), value.to_string()));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.headers
            .shift_remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// Returns true when the comma separated header `name` lists `token`
    /// (compared case-insensitively), e.g. `Connection: keep-alive, Upgrade`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn stringify(&self) -> String {
        let mut result = String::new();
        for (name, value) in self.iter() {
            result.push_str(&format!("{}: {}\r\n", name, value));
        }
        result
    }
}
