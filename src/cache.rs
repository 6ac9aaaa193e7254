use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, CacheOptions};
use crate::error::{BoxError, CacheError, Result};
use crate::refresh::{MetadataRegistry, RefreshPool};
use crate::store::{ExpiringStore, MemoryStore, Slot, expires_after};

/// State shared between callers and background refreshes.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn ExpiringStore>,
    pub(crate) metadata: MetadataRegistry,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Shared {
    /// Returns `Some(result)` on a hit, where `result` may be a cached absence.
    pub(crate) fn lookup<T: Clone + 'static>(&self, key: &str) -> Option<Option<T>> {
        let slot = self.store.get(key)?;
        trace!(key, absent = slot.is_absent(), "cache hit");
        Some(slot.into_value(key))
    }

    /// Stores a producer result, caching `None` only when asked to.
    pub(crate) fn store_result<T>(&self, key: &str, value: &Option<T>, options: CacheOptions)
    where
        T: Clone + Send + Sync + 'static,
    {
        if value.is_none() && !options.cache_absence {
            return;
        }
        let expires_at = expires_after(self.clock.now(), options.ttl);
        self.store
            .set(key, Slot::from_option(value.clone()), expires_at);
    }
}

/// A memoizing cache for the results of arbitrary producer functions.
///
/// Values of any type share one store; a given key must always be used with
/// the same value type. Producers return `Ok(None)` for "no result", which is
/// cached only when [`CacheOptions::cache_absence`] is set.
pub struct MemoCache {
    pub(crate) shared: Arc<Shared>,
    pub(crate) pool: RefreshPool,
}

impl MemoCache {
    /// Creates a cache backed by a [`MemoryStore`] on the system clock.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_clock(Arc::new(SystemClock), config)
    }

    /// Creates a cache whose store and refresh decisions follow `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        Self::with_store(store, clock, config)
    }

    /// Creates a cache on top of an existing store.
    ///
    /// `clock` should be the one the store uses to judge expiry.
    pub fn with_store(
        store: Arc<dyn ExpiringStore>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                metadata: MetadataRegistry::new(),
                clock,
            }),
            pool: RefreshPool::new(config),
        }
    }

    /// Returns the cached result for `key`, computing it with `producer` on a miss.
    ///
    /// Producer errors are returned as [`CacheError::Producer`] and never cached.
    ///
    /// # Panics
    ///
    /// Panics if `key` currently holds a value of a type other than `T`.
    pub fn get_or_compute<T, F, E>(
        &self,
        key: &str,
        options: CacheOptions,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<Option<T>, E>,
        E: Into<BoxError>,
    {
        if let Some(cached) = self.shared.lookup(key) {
            return Ok(cached);
        }

        debug!(key, "cache miss, computing");
        let value = producer().map_err(CacheError::producer)?;
        self.shared.store_result(key, &value, options);
        Ok(value)
    }

    /// Async counterpart of [`get_or_compute`](Self::get_or_compute).
    ///
    /// Only the calling task waits on the producer; other keys and other
    /// callers are never blocked by it.
    pub async fn get_or_compute_async<T, F, Fut, E>(
        &self,
        key: &str,
        options: CacheOptions,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        if let Some(cached) = self.shared.lookup(key) {
            return Ok(cached);
        }

        debug!(key, "cache miss, computing");
        let value = producer().await.map_err(CacheError::producer)?;
        self.shared.store_result(key, &value, options);
        Ok(value)
    }

    /// Removes the entry for `key`; the next call recomputes.
    ///
    /// Refresh metadata is kept.
    pub fn remove(&self, key: &str) {
        self.shared.store.remove(key);
    }

    /// Drops every entry and all refresh metadata.
    pub fn reset(&self) {
        self.shared.store.clear();
        self.shared.metadata.clear();
    }

    /// Number of entries currently held by the store.
    pub fn len(&self) -> usize {
        self.shared.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.is_empty()
    }
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn cache_with_clock() -> (MemoCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            MemoCache::with_clock(clock.clone(), CacheConfig::default()),
            clock,
        )
    }

    #[test]
    fn test_cache_basic_functionality() {
        let (cache, _) = cache_with_clock();
        let result = cache
            .get_or_compute("42", CacheOptions::default(), || {
                Ok::<_, BoxError>(Some("loaded_42".to_string()))
            })
            .unwrap();
        assert_eq!(result.as_deref(), Some("loaded_42"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_expiration() {
        let (cache, clock) = cache_with_clock();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, BoxError>(Some(1u32))
        };

        cache
            .get_or_compute("k", CacheOptions::new().with_ttl_ms(10), load)
            .unwrap();
        clock.advance(Duration::from_millis(20));
        cache
            .get_or_compute("k", CacheOptions::new().with_ttl_ms(10), load)
            .unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_clears_metadata() {
        let (cache, _) = cache_with_clock();
        cache
            .get_or_compute_with_refresh("k", CacheOptions::default(), || {
                Ok::<_, BoxError>(Some(1u8))
            })
            .unwrap();
        assert!(cache.shared.metadata.get("k").is_some());

        cache.reset();
        assert!(cache.is_empty());
        assert!(cache.shared.metadata.get("k").is_none());
    }
}
