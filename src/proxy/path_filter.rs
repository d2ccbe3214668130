//! Proxied-namespace predicate.
//!
//! # Design Decisions
//! - Prefix match on whole path segments: `/v1` covers `/v1` and `/v1/...`
//!   but not `/v10` or `/v1beta`
//! - Case-sensitive, like the rest of the path handling
//! - One instance is built per proxy and shared by every stage, so the
//!   handler gate, both rewriters and the statistics middleware classify a
//!   path identically

/// Decides whether a request path belongs to the upstream API namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    prefix: String,
}

impl PathFilter {
    /// Create a filter for the given namespace prefix (e.g. `/v1`).
    ///
    /// A trailing slash is ignored; an empty prefix or `/` proxies everything.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches('/').to_string();
        Self { prefix }
    }

    /// The normalized namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true iff `path` is under the proxied namespace.
    pub fn is_proxied(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.is_empty(),
            None => false,
        }
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new("/v1")
    }
}
