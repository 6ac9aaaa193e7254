//! A memoizing cache for the results of arbitrary functions
//!
//! [`MemoCache`] wraps synchronous or async producers: given a key it
//! returns the cached result while its TTL lasts, and otherwise runs the
//! producer, stores what it returns and hands it back. The refresh
//! variants additionally recompute hot entries in the background shortly
//! before they expire, so readers keep getting the cached value instead of
//! waiting on a miss.
//!
//! ```no_run
//! use memo_cache::{CacheOptions, MemoCache};
//!
//! let cache = MemoCache::new();
//! let price = cache.get_or_compute_with_refresh(
//!     "price:btc",
//!     CacheOptions::new().with_ttl_ms(5_000),
//!     || Ok::<_, std::io::Error>(Some(42_000u64)),
//! )?;
//! assert_eq!(price, Some(42_000));
//! # Ok::<(), memo_cache::CacheError>(())
//! ```
//!
//! A process-wide instance is available through the free functions in
//! [`global`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod global;
pub mod refresh;
pub mod store;

pub use cache::MemoCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheOptions};
pub use error::{BoxError, CacheError, RefreshError, Result};
pub use refresh::KeyMetadata;
pub use store::{Expiring, ExpiringStore, MemoryStore, Slot};
