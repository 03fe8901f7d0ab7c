//! Single-flight request cache with TTL freshness.
//!
//! This module implements the core caching logic: serve fresh entries,
//! coalesce concurrent callers onto one in-flight loader, and record the
//! settled outcome.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::clock::{Clock, SystemClock};
use crate::error::{FetchError, FetchResult};
use crate::options::{CacheConfig, RequestOptions};
use crate::read::FetchRead;
use crate::session::SessionState;
use crate::stats::CacheStats;

/// Shared handle to a running loader. Every waiter polls the same future.
type Flight<V> = Shared<BoxFuture<'static, FetchResult<FetchRead<V>>>>;

/// Hands the loader's future to a flight that is already registered.
type Start<V> = oneshot::Sender<BoxFuture<'static, FetchResult<V>>>;

/// A registered flight. The generation tells a settling task whether it is
/// still the flight for its key or was invalidated while running.
struct InFlight<V> {
    flight: Flight<V>,
    generation: u64,
}

struct Entry<V> {
    value: V,
    fetched_at: DateTime<Utc>,
}

impl<V> Entry<V> {
    /// Valid iff `now - fetched_at < ttl`.
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.fetched_at) < ttl,
            // A TTL too large for chrono never expires.
            Err(_) => true,
        }
    }
}

/// Per-key fetch state, as a dashboard would show it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyStatus {
    /// A loader for this key is running.
    pub loading: bool,
    /// At least one request for this key has settled successfully since the
    /// last reset.
    pub has_fetched: bool,
    /// Error from the most recent failed flight, cleared on success.
    pub last_error: Option<FetchError>,
}

struct State<V> {
    entries: HashMap<String, Entry<V>>,
    in_flight: HashMap<String, InFlight<V>>,
    statuses: HashMap<String, KeyStatus>,
    stats: CacheStats,
    next_generation: u64,
}

impl<V> Default for State<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            statuses: HashMap::new(),
            stats: CacheStats::default(),
            next_generation: 0,
        }
    }
}

impl<V: Clone> State<V> {
    /// Store a current flight's outcome as the entry and status for `key`.
    fn record(&mut self, key: &str, result: &FetchResult<FetchRead<V>>) {
        let status = self.statuses.entry(key.to_owned()).or_default();
        status.loading = false;
        match result {
            Ok(read) => {
                self.entries.insert(
                    key.to_owned(),
                    Entry {
                        value: read.value().clone(),
                        fetched_at: read.fetched_at(),
                    },
                );
                status.has_fetched = true;
                status.last_error = None;
            }
            Err(err) => status.last_error = Some(err.clone()),
        }
    }
}

/// `key` equals `prefix` or continues it with a path or query separator.
fn is_under(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix).is_some_and(|rest| {
        rest.is_empty()
            || prefix.ends_with(['/', '?'])
            || rest.starts_with(['/', '?'])
    })
}

struct Inner<V, C> {
    state: Mutex<State<V>>,
    session: Arc<dyn SessionState>,
    clock: C,
    config: CacheConfig,
}

enum Begin<V> {
    Hit(FetchRead<V>),
    Started { flight: Flight<V>, start: Start<V> },
    Joined(Flight<V>),
}

/// Single-flight TTL cache for authenticated requests.
///
/// Clones share the same entries and in-flight registry. There is no
/// global instance: construct one per session (or per test) and drop it, or
/// call [`clear`](Self::clear), to reset.
///
/// Entries are never evicted on their own. A stale entry is ignored and
/// overwritten by the next successful fetch for its key.
///
/// Loaders run on a spawned Tokio task, so `request` must be called from
/// within a Tokio runtime. The task runs to completion even if every caller
/// stops waiting.
pub struct RequestCache<V, C = SystemClock> {
    inner: Arc<Inner<V, C>>,
}

impl<V> RequestCache<V, SystemClock>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache on the wall clock with default configuration.
    pub fn with_defaults(session: Arc<dyn SessionState>) -> Self {
        Self::new(session, SystemClock, CacheConfig::default())
    }
}

impl<V, C> RequestCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Clock,
{
    pub fn new(session: Arc<dyn SessionState>, clock: C, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                session,
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &C {
        &self.inner.clock
    }

    /// Fetch `key`, going through the cache and the in-flight registry.
    ///
    /// - No session: fails with [`FetchError::Unauthenticated`], `loader`
    ///   is not called.
    /// - Fresh entry and no `skip_cache`: returned without calling `loader`.
    /// - Flight already running for `key`: its outcome is shared.
    /// - Otherwise `loader` is called once and its future becomes the
    ///   flight for `key`.
    ///
    /// The key is the sole identity of a request: it must encode every
    /// parameter that affects the response.
    ///
    /// `loader` is called after the flight is registered and the state lock
    /// is released, so it may use this cache. If it panics before returning
    /// a future, the panic reaches this caller and every joined waiter gets
    /// [`FetchError::LoaderPanicked`].
    pub async fn request<K, F, Fut>(
        &self,
        key: K,
        loader: F,
        options: RequestOptions<V>,
    ) -> FetchResult<FetchRead<V>>
    where
        K: Into<String>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let key = key.into();
        if !self.inner.session.is_authenticated() {
            tracing::warn!(%key, "Request attempted without an authenticated session");
            return Err(FetchError::unauthenticated(format!(
                "no active session for {key}"
            )));
        }

        match self.begin(&key, options) {
            Begin::Hit(read) => Ok(read),
            Begin::Started { flight, start } => {
                if start.send(loader().boxed()).is_err() {
                    tracing::debug!(%key, "Flight task ended before its loader started");
                }
                flight.await
            }
            Begin::Joined(flight) => flight.await.map(FetchRead::into_coalesced),
        }
    }

    /// Decide how to serve `key` under a single lock acquisition, so two
    /// callers can never both start a loader.
    fn begin(&self, key: &str, options: RequestOptions<V>) -> Begin<V> {
        let now = self.inner.clock.now();
        let ttl = options.ttl.unwrap_or(self.inner.config.default_ttl);

        let mut guard = self.inner.lock();
        let state = &mut *guard;

        if !options.skip_cache {
            if let Some(entry) = state.entries.get(key) {
                if entry.is_fresh(now, ttl) {
                    state.stats.hits += 1;
                    tracing::debug!(%key, "Serving cached response");
                    return Begin::Hit(FetchRead::from_cache(
                        entry.value.clone(),
                        entry.fetched_at,
                    ));
                }
            }
        }

        if let Some(running) = state.in_flight.get(key) {
            state.stats.coalesced += 1;
            tracing::debug!(%key, "Joining in-flight request");
            return Begin::Joined(running.flight.clone());
        }

        state.stats.misses += 1;
        let fallback = if self.inner.config.fallback.is_enabled() {
            options.fallback
        } else {
            None
        };
        let generation = state.next_generation;
        state.next_generation += 1;
        let (start, loaded) = oneshot::channel();
        let flight = self.launch(key.to_owned(), generation, loaded, fallback);
        state.in_flight.insert(
            key.to_owned(),
            InFlight {
                flight: flight.clone(),
                generation,
            },
        );
        state.statuses.entry(key.to_owned()).or_default().loading = true;
        tracing::debug!(%key, skip_cache = options.skip_cache, "Starting request");
        Begin::Started { flight, start }
    }

    /// Spawn the flight task and wrap its join handle as a shareable flight.
    ///
    /// The task waits for the loader's future on `loaded`. Called with the
    /// state lock held; the task needs the same lock to settle, so the
    /// in-flight entry is always registered first.
    fn launch(
        &self,
        key: String,
        generation: u64,
        loaded: oneshot::Receiver<BoxFuture<'static, FetchResult<V>>>,
        fallback: Option<V>,
    ) -> Flight<V> {
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = match loaded.await {
                Ok(future) => AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(FetchError::LoaderPanicked {
                            key: task_key.clone(),
                        })
                    }),
                // The caller panicked inside the loader closure.
                Err(_) => Err(FetchError::LoaderPanicked {
                    key: task_key.clone(),
                }),
            };
            inner.settle(&task_key, generation, outcome, fallback)
        });

        async move {
            handle
                .await
                .unwrap_or_else(|_| Err(FetchError::LoaderPanicked { key }))
        }
        .boxed()
        .shared()
    }

    /// Fresh entry for `key` under the default TTL, without loading.
    pub fn peek(&self, key: &str) -> Option<FetchRead<V>> {
        let now = self.inner.clock.now();
        let state = self.inner.lock();
        state
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.inner.config.default_ttl))
            .map(|entry| FetchRead::from_cache(entry.value.clone(), entry.fetched_at))
    }

    pub fn status(&self, key: &str) -> KeyStatus {
        self.inner
            .lock()
            .statuses
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner.lock().in_flight.contains_key(key)
    }

    /// Forget the entry, fetch status and running flight for `key`.
    ///
    /// A flight that was running still delivers to the callers already
    /// waiting on it, but its result is not cached; the next request starts
    /// a new flight. Returns whether an entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.inner.lock();
        state.statuses.remove(key);
        state.in_flight.remove(key);
        let removed = state.entries.remove(key).is_some();
        if removed {
            tracing::debug!(%key, "Invalidated cache entry");
        }
        removed
    }

    /// [`invalidate`](Self::invalidate) every key equal to `prefix` or below
    /// it: `/api/users` covers `/api/users?page=1` and `/api/users/7`, not
    /// `/api/users-archive`. Returns the number of entries removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let before = state.entries.len();
        state.entries.retain(|key, _| !is_under(key, prefix));
        state.statuses.retain(|key, _| !is_under(key, prefix));
        state.in_flight.retain(|key, _| !is_under(key, prefix));
        let removed = before - state.entries.len();
        tracing::debug!(%prefix, removed, "Invalidated cache entries by prefix");
        removed
    }

    /// Drop all entries, statuses and flights. Running loaders still deliver
    /// to their waiters but do not repopulate the cache.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        state.statuses.clear();
        state.in_flight.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        CacheStats {
            entry_count: state.entries.len() as u64,
            in_flight: state.in_flight.len() as u64,
            ..state.stats.clone()
        }
    }

    /// Number of stored entries, fresh or stale.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V, C> Inner<V, C>
where
    V: Clone,
    C: Clock,
{
    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a flight's outcome and produce the value every waiter sees.
    ///
    /// Only the flight still registered under `generation` writes to the
    /// cache; an invalidated one just delivers to its waiters.
    fn settle(
        &self,
        key: &str,
        generation: u64,
        outcome: FetchResult<V>,
        fallback: Option<V>,
    ) -> FetchResult<FetchRead<V>> {
        let now = self.clock.now();
        let mut state = self.lock();

        let current = state
            .in_flight
            .get(key)
            .is_some_and(|running| running.generation == generation);
        if current {
            state.in_flight.remove(key);
        }

        let result = match (outcome, fallback) {
            (Ok(value), _) => {
                tracing::debug!(%key, "Request settled");
                Ok(FetchRead::from_network(value, now))
            }
            (Err(FetchError::Transport(cause)), Some(placeholder)) => {
                tracing::warn!(%key, error = %cause, "Substituting placeholder after transport failure");
                state.stats.fallbacks += 1;
                Ok(FetchRead::from_fallback(placeholder, now, cause))
            }
            (Err(err), _) => {
                tracing::warn!(%key, error = %err, "Request failed");
                state.stats.failures += 1;
                Err(err)
            }
        };

        if current {
            state.record(key, &result);
        } else {
            tracing::debug!(%key, "Flight was invalidated while running, result not cached");
        }
        result
    }
}

impl<V, C> Clone for RequestCache<V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TransportError;
    use crate::options::FallbackMode;
    use crate::session::SessionFlag;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_cache(config: CacheConfig) -> (RequestCache<String, ManualClock>, ManualClock) {
        let clock = ManualClock::default();
        let cache = RequestCache::new(Arc::new(SessionFlag::signed_in()), clock.clone(), config);
        (cache, clock)
    }

    fn loader(
        calls: &Arc<AtomicUsize>,
        outcome: FetchResult<String>,
    ) -> impl FnOnce() -> BoxFuture<'static, FetchResult<String>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { outcome }.boxed()
        }
    }

    #[test]
    fn test_entry_freshness_boundary() {
        let fetched_at = Utc::now();
        let entry = Entry {
            value: (),
            fetched_at,
        };
        let ttl = Duration::from_secs(300);

        assert!(entry.is_fresh(fetched_at + chrono::Duration::seconds(299), ttl));
        assert!(!entry.is_fresh(fetched_at + chrono::Duration::seconds(300), ttl));
        assert!(!entry.is_fresh(fetched_at + chrono::Duration::seconds(301), ttl));
    }

    #[tokio::test]
    async fn test_cache_miss_then_hit() {
        let (cache, _clock) = make_cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .request("/api/alerts", loader(&calls, Ok("v1".into())), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(first.source(), &crate::FetchSource::Network);

        let second = cache
            .request("/api/alerts", loader(&calls, Ok("v2".into())), RequestOptions::new())
            .await
            .unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_never_calls_loader() {
        let session = SessionFlag::signed_out();
        let cache: RequestCache<String, ManualClock> = RequestCache::new(
            Arc::new(session.clone()),
            ManualClock::default(),
            CacheConfig::default(),
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let err = cache
            .request("/api/users", loader(&calls, Ok("v".into())), RequestOptions::new())
            .await
            .unwrap_err();

        assert!(err.is_unauthenticated());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failure_records_status_and_leaves_no_flight() {
        let (cache, _clock) = make_cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let failure: FetchError = TransportError::status(500, "Internal Server Error").into();

        let err = cache
            .request("/api/backups", loader(&calls, Err(failure.clone())), RequestOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err, failure);
        assert!(!cache.is_in_flight("/api/backups"));
        let status = cache.status("/api/backups");
        assert!(!status.loading);
        assert!(!status.has_fetched);
        assert_eq!(status.last_error, Some(failure));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_fallback_ignored_when_disabled() {
        let (cache, _clock) = make_cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let result = cache
            .request(
                "/api/reports",
                loader(&calls, Err(TransportError::connection("refused").into())),
                RequestOptions::new().with_fallback("placeholder".to_string()),
            )
            .await;

        assert!(result.is_err());
        assert!(cache.peek("/api/reports").is_none());
    }

    #[tokio::test]
    async fn test_fallback_fills_cache_when_enabled() {
        let (cache, _clock) =
            make_cache(CacheConfig::new().with_fallback(FallbackMode::OnTransportFailure));
        let calls = Arc::new(AtomicUsize::new(0));

        let read = cache
            .request(
                "/api/reports",
                loader(&calls, Err(TransportError::connection("refused").into())),
                RequestOptions::new().with_fallback("placeholder".to_string()),
            )
            .await
            .unwrap();

        assert!(read.used_fallback());
        assert_eq!(read.value(), "placeholder");
        assert_eq!(
            cache.peek("/api/reports").map(FetchRead::into_value),
            Some("placeholder".to_string())
        );
        assert_eq!(cache.stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn test_fallback_not_used_for_unauthenticated_loader_error() {
        let (cache, _clock) =
            make_cache(CacheConfig::new().with_fallback(FallbackMode::OnTransportFailure));
        let calls = Arc::new(AtomicUsize::new(0));

        let err = cache
            .request(
                "/api/users",
                loader(&calls, Err(FetchError::unauthenticated("token expired"))),
                RequestOptions::new().with_fallback("placeholder".to_string()),
            )
            .await
            .unwrap_err();

        assert!(err.is_unauthenticated());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_per_request_ttl_overrides_default() {
        let (cache, clock) = make_cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .request("/api/alerts", loader(&calls, Ok("v1".into())), RequestOptions::new())
            .await
            .unwrap();
        clock.advance(Duration::from_secs(20));

        let read = cache
            .request(
                "/api/alerts",
                loader(&calls, Ok("v2".into())),
                RequestOptions::new().with_ttl(Duration::from_secs(10)),
            )
            .await
            .unwrap();

        assert_eq!(read.into_value(), "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_prefix() {
        let (cache, _clock) = make_cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["/api/users?page=1", "/api/users?page=2", "/api/alerts"] {
            cache
                .request(key, loader(&calls, Ok(key.to_string())), RequestOptions::new())
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.status("/api/alerts").has_fetched);

        assert!(cache.invalidate("/api/alerts"));
        assert!(!cache.invalidate("/api/alerts"));
        assert_eq!(cache.status("/api/alerts"), KeyStatus::default());

        assert_eq!(cache.invalidate_prefix("/api/users"), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_prefix_matches_whole_segments() {
        assert!(is_under("/api/users", "/api/users"));
        assert!(is_under("/api/users?page=2", "/api/users"));
        assert!(is_under("/api/users/7/approve", "/api/users"));
        assert!(is_under("/api/users/pending", "/api/users/"));
        assert!(!is_under("/api/users-archive", "/api/users"));
        assert!(!is_under("/api/usersettings", "/api/users"));
        assert!(!is_under("/api/alerts", "/api/users"));
    }

    #[tokio::test]
    async fn test_invalidate_prefix_spares_sibling_paths() {
        let (cache, _clock) = make_cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["/api/users?page=1", "/api/users/pending", "/api/users-archive"] {
            cache
                .request(key, loader(&calls, Ok(key.to_string())), RequestOptions::new())
                .await
                .unwrap();
        }

        assert_eq!(cache.invalidate_prefix("/api/users"), 2);
        assert!(cache.peek("/api/users-archive").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_resets_entries() {
        let (cache, _clock) = make_cache(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .request("/api/access", loader(&calls, Ok("v1".into())), RequestOptions::new())
            .await
            .unwrap();
        cache.clear();

        assert!(cache.peek("/api/access").is_none());
        cache
            .request("/api/access", loader(&calls, Ok("v2".into())), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
