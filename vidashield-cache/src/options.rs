//! Cache-wide configuration and per-request options.

use std::time::Duration;

/// Validity window for cache entries when neither the config nor the
/// request overrides it (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// What to do when a loader fails with a transport error and the caller
/// supplied a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackMode {
    /// Always propagate the error; placeholders are ignored.
    #[default]
    Disabled,
    /// Substitute the placeholder, cache it, and report success with
    /// [`FetchSource::Fallback`](crate::FetchSource::Fallback).
    OnTransportFailure,
}

impl FallbackMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::OnTransportFailure)
    }
}

/// Configuration for the request cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when a request does not set its own.
    pub default_ttl: Duration,
    /// Placeholder substitution policy.
    pub fallback: FallbackMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            fallback: FallbackMode::Disabled,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the placeholder substitution policy.
    pub fn with_fallback(mut self, fallback: FallbackMode) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Per-request flags.
#[derive(Debug, Clone)]
pub struct RequestOptions<V> {
    /// Overrides [`CacheConfig::default_ttl`] for the freshness check.
    pub ttl: Option<Duration>,
    /// Ignore any fresh entry and go to the loader.
    pub skip_cache: bool,
    /// Placeholder used on transport failure when fallback is enabled.
    pub fallback: Option<V>,
}

impl<V> Default for RequestOptions<V> {
    fn default() -> Self {
        Self {
            ttl: None,
            skip_cache: false,
            fallback: None,
        }
    }
}

impl<V> RequestOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Force a fresh request.
    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn with_fallback(mut self, fallback: V) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Wrap or unwrap the placeholder, keeping the flags.
    pub fn map_fallback<U, F>(self, f: F) -> RequestOptions<U>
    where
        F: FnOnce(V) -> U,
    {
        RequestOptions {
            ttl: self.ttl,
            skip_cache: self.skip_cache,
            fallback: self.fallback.map(f),
        }
    }

    /// Convert the placeholder into another value type, keeping the flags.
    pub fn try_map_fallback<U, E, F>(self, f: F) -> Result<RequestOptions<U>, E>
    where
        F: FnOnce(V) -> Result<U, E>,
    {
        Ok(RequestOptions {
            ttl: self.ttl,
            skip_cache: self.skip_cache,
            fallback: self.fallback.map(f).transpose()?,
        })
    }
}
