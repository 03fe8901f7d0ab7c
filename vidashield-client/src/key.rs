//! Canonical cache keys for API resources.
//!
//! The cache treats the key as the sole identity of a request, so every
//! query parameter that shapes the response must be part of it. Parameters
//! are kept sorted, which makes the key independent of the order the caller
//! added them in.

use std::collections::BTreeMap;
use std::fmt;
use vidashield_cache::{FetchError, FetchResult};

/// An API path plus its query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    path: String,
    query: BTreeMap<String, String>,
}

impl ResourceKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    /// Add a query parameter. Empty values are skipped, as the backend
    /// treats a missing filter and an empty one the same way.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.query.insert(name.into(), value);
        }
        self
    }

    /// Add a query parameter only when it is set.
    pub fn param_opt<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// Parse `path?k=v&...` as typed on a command line.
    ///
    /// Pairs without `=` become empty values and are dropped. Undecodable
    /// pairs are kept verbatim.
    pub fn parse(raw: &str) -> Self {
        let (path, query) = raw.split_once('?').unwrap_or((raw, ""));
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .fold(Self::new(path), |key, pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                key.param(decode(name), decode(value))
            })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// The cache identity: `path?k=v&...` with percent-encoded, sorted pairs.
    pub fn cache_key(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }

    /// Absolute URL under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.cache_key())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Percent-encode an id for use as one path segment.
///
/// Empty, `.` and `..` ids are rejected: URL parsing collapses dot segments
/// even when they are percent-encoded, so they would retarget the request.
pub fn path_segment(raw: &str) -> FetchResult<String> {
    if matches!(raw, "" | "." | "..") {
        return Err(FetchError::invalid_request(format!(
            "{raw:?} is not a valid path segment"
        )));
    }
    Ok(urlencoding::encode(raw).into_owned())
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cache_key_without_query() {
        assert_eq!(ResourceKey::new("/api/users/pending").cache_key(), "/api/users/pending");
    }

    #[test]
    fn test_cache_key_sorts_and_encodes() {
        let key = ResourceKey::new("/api/users")
            .param("page", 1)
            .param("limit", 10)
            .param("search", "joão silva")
            .param("status", "")
            .param_opt("role", None::<&str>);

        assert_eq!(
            key.cache_key(),
            "/api/users?limit=10&page=1&search=jo%C3%A3o%20silva"
        );
    }

    #[test]
    fn test_url_joins_base() {
        let key = ResourceKey::new("/api/dashboard/activity").param("limit", 10);
        assert_eq!(
            key.url("https://api.vidashield.com/"),
            "https://api.vidashield.com/api/dashboard/activity?limit=10"
        );
    }

    #[test]
    fn test_parse_normalizes_query() {
        let key = ResourceKey::parse("/api/users?search=jo%C3%A3o%20silva&page=2&status=");
        assert_eq!(key.path(), "/api/users");
        assert_eq!(key.query().get("search").map(String::as_str), Some("joão silva"));
        assert_eq!(key.cache_key(), "/api/users?page=2&search=jo%C3%A3o%20silva");

        assert_eq!(ResourceKey::parse("/api/users/pending").cache_key(), "/api/users/pending");
    }

    #[test]
    fn test_path_segment_encodes_separators() {
        assert_eq!(path_segment("42").unwrap(), "42");
        assert_eq!(path_segment("a/b?c").unwrap(), "a%2Fb%3Fc");
        assert_eq!(path_segment("../admin").unwrap(), "..%2Fadmin");
        for bad in ["", ".", ".."] {
            assert!(matches!(
                path_segment(bad),
                Err(FetchError::InvalidRequest { .. })
            ));
        }
    }

    proptest! {
        #[test]
        fn key_is_independent_of_param_order(
            params in proptest::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9 &=?]{1,8}", 0..6)
        ) {
            let forward = params
                .iter()
                .fold(ResourceKey::new("/api/alerts"), |key, (k, v)| key.param(k.clone(), v));
            let backward = params
                .iter()
                .rev()
                .fold(ResourceKey::new("/api/alerts"), |key, (k, v)| key.param(k.clone(), v));
            prop_assert_eq!(forward.cache_key(), backward.cache_key());
        }

        #[test]
        fn different_filter_values_give_different_keys(a in "[a-z0-9&=]{1,8}", b in "[a-z0-9&=]{1,8}") {
            prop_assume!(a != b);
            let left = ResourceKey::new("/api/users").param("search", &a);
            let right = ResourceKey::new("/api/users").param("search", &b);
            prop_assert_ne!(left.cache_key(), right.cache_key());
        }
    }
}
