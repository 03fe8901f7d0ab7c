//! Provenance metadata for request results.
//!
//! A cached request never hands back a bare value: callers get a
//! [`FetchRead<T>`] that records where the value came from and when it was
//! fetched, so a placeholder can never be mistaken for live data.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::TransportError;

/// Where the value of a successful request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSource {
    /// A fresh cache entry; no loader ran.
    Cache,
    /// This caller's loader ran and succeeded.
    Network,
    /// Another caller's in-flight request was shared.
    Coalesced,
    /// The loader failed and the caller's placeholder was substituted.
    Fallback {
        /// The transport failure the placeholder is standing in for.
        cause: TransportError,
    },
}

/// Result of a cached request, carrying provenance metadata.
#[derive(Debug, Clone)]
pub struct FetchRead<T> {
    value: T,
    fetched_at: DateTime<Utc>,
    source: FetchSource,
}

impl<T> FetchRead<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>, source: FetchSource) -> Self {
        Self {
            value,
            fetched_at,
            source,
        }
    }

    /// A read served from a fresh cache entry.
    pub fn from_cache(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self::new(value, fetched_at, FetchSource::Cache)
    }

    /// A read produced by the loader.
    pub fn from_network(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self::new(value, fetched_at, FetchSource::Network)
    }

    /// A placeholder substituted after a transport failure.
    pub fn from_fallback(value: T, fetched_at: DateTime<Utc>, cause: TransportError) -> Self {
        Self::new(value, fetched_at, FetchSource::Fallback { cause })
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the value was fetched (or substituted).
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn source(&self) -> &FetchSource {
        &self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        matches!(self.source, FetchSource::Cache)
    }

    pub fn was_coalesced(&self) -> bool {
        matches!(self.source, FetchSource::Coalesced)
    }

    pub fn used_fallback(&self) -> bool {
        matches!(self.source, FetchSource::Fallback { .. })
    }

    /// How old the value is relative to `now`. Never negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Relabel a network read handed to a waiter that joined someone
    /// else's flight. Fallback reads keep their cause.
    pub(crate) fn into_coalesced(mut self) -> Self {
        if matches!(self.source, FetchSource::Network) {
            self.source = FetchSource::Coalesced;
        }
        self
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> FetchRead<U>
    where
        F: FnOnce(T) -> U,
    {
        FetchRead {
            value: f(self.value),
            fetched_at: self.fetched_at,
            source: self.source,
        }
    }

    /// Fallible [`map`](Self::map), used for typed decoding of cached JSON.
    pub fn try_map<U, E, F>(self, f: F) -> Result<FetchRead<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(FetchRead {
            value: f(self.value)?,
            fetched_at: self.fetched_at,
            source: self.source,
        })
    }
}

impl<T> AsRef<T> for FetchRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_read_from_cache() {
        let fetched_at = Utc::now();
        let read = FetchRead::from_cache("users".to_string(), fetched_at);

        assert!(read.was_cache_hit());
        assert!(!read.used_fallback());
        assert_eq!(read.value(), "users");
        assert_eq!(read.fetched_at(), fetched_at);
    }

    #[test]
    fn test_fetch_read_age() {
        let fetched_at = Utc::now();
        let read = FetchRead::from_network(1u8, fetched_at);

        assert_eq!(
            read.age(fetched_at + chrono::Duration::seconds(42)),
            Duration::from_secs(42)
        );
        // Clock skew backwards clamps to zero.
        assert_eq!(
            read.age(fetched_at - chrono::Duration::seconds(5)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_coalesced_relabel_keeps_fallback_cause() {
        let now = Utc::now();
        let network = FetchRead::from_network(1, now).into_coalesced();
        assert!(network.was_coalesced());

        let cause = TransportError::status(502, "Bad Gateway");
        let fallback = FetchRead::from_fallback(1, now, cause.clone()).into_coalesced();
        assert_eq!(fallback.source(), &FetchSource::Fallback { cause });
    }

    #[test]
    fn test_fetch_read_try_map() {
        let read = FetchRead::from_network("42".to_string(), Utc::now());
        let parsed = read.try_map(|v| v.parse::<i32>()).unwrap();
        assert_eq!(parsed.into_value(), 42);

        let bad = FetchRead::from_network("x".to_string(), Utc::now());
        assert!(bad.try_map(|v| v.parse::<i32>()).is_err());
    }
}
