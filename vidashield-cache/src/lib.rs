//! VidaShield Cache - Authenticated Request Cache
//!
//! A single-flight, TTL-bounded cache that sits in front of authenticated
//! API calls. The HTTP side lives in `vidashield-client`; this crate only
//! knows about keys, loaders and time.
//!
//! # Guarantees
//!
//! - A request for a key with a fresh entry never reaches the loader.
//! - Concurrent requests for the same key share one loader invocation and
//!   all observe the identical outcome.
//! - No credential means no loader call: the request fails with
//!   [`FetchError::Unauthenticated`].
//!
//! Staleness is explicit: every successful request returns a [`FetchRead<T>`]
//! that says whether the value came from the cache, the network, another
//! caller's flight or a caller-supplied placeholder.
//!
//! # Example
//!
//! ```ignore
//! let cache = RequestCache::with_defaults(session);
//!
//! let read = cache
//!     .request("/api/users?limit=10&page=1", move || load_users(client), RequestOptions::new())
//!     .await?;
//!
//! if read.was_cache_hit() {
//!     tracing::debug!("served from cache");
//! }
//! ```

pub mod clock;
pub mod error;
pub mod options;
pub mod read;
pub mod request_cache;
pub mod session;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FetchError, FetchResult, TransportError};
pub use options::{CacheConfig, FallbackMode, RequestOptions, DEFAULT_TTL};
pub use read::{FetchRead, FetchSource};
pub use request_cache::{KeyStatus, RequestCache};
pub use session::{SessionFlag, SessionState};
pub use stats::CacheStats;
