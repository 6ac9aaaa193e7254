//! Refresh-ahead: recompute hot entries in the background shortly before
//! they expire, while the cached value keeps serving reads.
//!
//! Every key read through a refresh variant gets a [`KeyMetadata`] record
//! holding the time of its last (re)compute, its TTL and an in-flight flag.
//! A hit past [`REFRESH_THRESHOLD`] of the TTL claims the flag and hands
//! the producer to a bounded pool; the caller returns the current value
//! without waiting. Background failures are logged and dropped, so the
//! stale value serves until it expires and a miss recomputes it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::cache::{MemoCache, Shared};
use crate::config::{CacheConfig, CacheOptions, MIN_REFRESH_TTL, REFRESH_THRESHOLD};
use crate::error::{BoxError, CacheError, RefreshError, Result};

/// Refresh bookkeeping for one key.
#[derive(Debug)]
pub struct KeyMetadata {
    key: String,
    /// `None` until the first compute, which reads as "infinitely old".
    last_refresh: Mutex<Option<Instant>>,
    ttl: Mutex<Duration>,
    refresh_in_flight: AtomicBool,
}

impl KeyMetadata {
    fn new(key: &str, ttl: Duration) -> Self {
        Self {
            key: key.to_owned(),
            last_refresh: Mutex::new(None),
            ttl: Mutex::new(ttl),
            refresh_in_flight: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        *self.last_refresh.lock()
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.lock()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_flight.load(Ordering::Acquire)
    }

    /// Whether a hit at `now` should also refresh the entry.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        if self.is_refreshing() {
            return false;
        }
        let ttl = self.ttl();
        if ttl <= MIN_REFRESH_TTL {
            return false;
        }
        match self.last_refresh() {
            None => true,
            Some(at) => now.saturating_duration_since(at) > ttl.mul_f64(REFRESH_THRESHOLD),
        }
    }

    fn record_refresh(&self, now: Instant, ttl: Duration) {
        *self.last_refresh.lock() = Some(now);
        *self.ttl.lock() = ttl;
    }

    /// Claims the in-flight flag if a refresh is due. Returns the guard
    /// that releases it.
    fn try_begin_refresh(self: &Arc<Self>, now: Instant) -> Option<RefreshGuard> {
        if !self.needs_refresh(now) || self.refresh_in_flight.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(RefreshGuard {
            metadata: Arc::clone(self),
        })
    }
}

/// Clears the in-flight flag on drop, including when the producer panics
/// or the job is rejected by the pool.
struct RefreshGuard {
    metadata: Arc<KeyMetadata>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.metadata
            .refresh_in_flight
            .store(false, Ordering::Release);
    }
}

/// Concurrent map of key to [`KeyMetadata`]. Entries live until cleared.
#[derive(Debug, Default)]
pub(crate) struct MetadataRegistry {
    entries: DashMap<String, Arc<KeyMetadata>>,
}

impl MetadataRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<KeyMetadata>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn get_or_insert(&self, key: &str, ttl: Duration) -> Arc<KeyMetadata> {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        let entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(KeyMetadata::new(key, ttl)));
        Arc::clone(entry.value())
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}

/// Bounded executor for background refreshes.
///
/// Runs on its own runtime, built on first use, so sync callers need no
/// ambient runtime and async callers never share workers with refreshes.
pub(crate) struct RefreshPool {
    config: CacheConfig,
    runtime: Mutex<Option<Runtime>>,
    permits: Arc<Semaphore>,
}

impl RefreshPool {
    pub(crate) fn new(config: CacheConfig) -> Self {
        let limit = config.max_pending_refreshes.max(1);
        Self {
            config,
            runtime: Mutex::new(None),
            permits: Arc::new(Semaphore::new(limit)),
        }
    }

    fn acquire(&self) -> std::result::Result<OwnedSemaphorePermit, RefreshError> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| RefreshError::Saturated {
                limit: self.config.max_pending_refreshes,
            })
    }

    fn with_runtime<R>(
        &self,
        f: impl FnOnce(&Runtime) -> R,
    ) -> std::result::Result<R, RefreshError> {
        let mut slot = self.runtime.lock();
        let runtime = match slot.take() {
            Some(runtime) => runtime,
            None => {
                let workers = self.config.refresh_workers.max(1);
                let built = Builder::new_multi_thread()
                    .worker_threads(workers)
                    .max_blocking_threads(workers)
                    .thread_name("memo-cache-refresh")
                    .enable_all()
                    .build()?;
                debug!(workers, "started refresh runtime");
                built
            }
        };
        let result = f(&runtime);
        *slot = Some(runtime);
        Ok(result)
    }

    /// Runs a blocking job on the pool without waiting for it.
    pub(crate) fn submit_blocking<J>(&self, job: J) -> std::result::Result<(), RefreshError>
    where
        J: FnOnce() + Send + 'static,
    {
        let permit = self.acquire()?;
        self.with_runtime(move |rt| {
            rt.spawn_blocking(move || {
                let _permit = permit;
                job();
            });
        })
    }

    /// Runs a future on the pool without waiting for it.
    pub(crate) fn submit<J>(&self, job: J) -> std::result::Result<(), RefreshError>
    where
        J: Future<Output = ()> + Send + 'static,
    {
        let permit = self.acquire()?;
        self.with_runtime(move |rt| {
            rt.spawn(async move {
                let _permit = permit;
                job.await;
            });
        })
    }
}

impl Drop for RefreshPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl Shared {
    fn refresh_once<T, F, E>(&self, key: &str, options: CacheOptions, producer: F)
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<Option<T>, E>,
        E: Into<BoxError>,
    {
        if self.metadata.get(key).is_none() {
            return;
        }
        let outcome = producer().map_err(Into::into);
        self.finish_refresh(key, options, outcome);
    }

    async fn refresh_once_async<T, F, Fut, E>(&self, key: &str, options: CacheOptions, producer: F)
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        if self.metadata.get(key).is_none() {
            return;
        }
        let outcome = producer().await.map_err(Into::into);
        self.finish_refresh(key, options, outcome);
    }

    fn finish_refresh<T>(
        &self,
        key: &str,
        options: CacheOptions,
        outcome: std::result::Result<Option<T>, BoxError>,
    ) where
        T: Clone + Send + Sync + 'static,
    {
        match outcome {
            Ok(value) => {
                self.store_result(key, &value, options);
                // Metadata may have been cleared by a reset while we ran.
                if let Some(metadata) = self.metadata.get(key) {
                    metadata.record_refresh(self.clock.now(), options.ttl);
                }
                debug!(key, "background refresh complete");
            }
            Err(err) => {
                warn!(key, error = %err, "background refresh failed, keeping cached value");
            }
        }
    }

    fn record_compute(&self, metadata: &KeyMetadata, options: CacheOptions) {
        metadata.record_refresh(self.clock.now(), options.ttl);
    }
}

impl MemoCache {
    /// Like [`get_or_compute`](Self::get_or_compute), but a hit past 80% of
    /// the key's TTL (for TTLs over 500ms) also recomputes the entry in the
    /// background. The caller always gets the currently cached value
    /// straight away; failures of the background run are logged, never
    /// returned.
    ///
    /// # Panics
    ///
    /// Panics if `key` currently holds a value of a type other than `T`.
    pub fn get_or_compute_with_refresh<T, F, E>(
        &self,
        key: &str,
        options: CacheOptions,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<Option<T>, E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let metadata = self.shared.metadata.get_or_insert(key, options.ttl);

        if let Some(cached) = self.shared.lookup(key) {
            if let Some(guard) = metadata.try_begin_refresh(self.shared.clock.now()) {
                let shared = Arc::clone(&self.shared);
                let owned_key = key.to_owned();
                let scheduled = self.pool.submit_blocking(move || {
                    let _guard = guard;
                    shared.refresh_once(&owned_key, options, producer);
                });
                log_scheduled(key, scheduled);
            }
            return Ok(cached);
        }

        debug!(key, "cache miss, computing");
        let value = producer().map_err(CacheError::producer)?;
        self.shared.store_result(key, &value, options);
        self.shared.record_compute(&metadata, options);
        Ok(value)
    }

    /// Async counterpart of
    /// [`get_or_compute_with_refresh`](Self::get_or_compute_with_refresh).
    pub async fn get_or_compute_with_refresh_async<T, F, Fut, E>(
        &self,
        key: &str,
        options: CacheOptions,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let metadata = self.shared.metadata.get_or_insert(key, options.ttl);

        if let Some(cached) = self.shared.lookup(key) {
            if let Some(guard) = metadata.try_begin_refresh(self.shared.clock.now()) {
                let shared = Arc::clone(&self.shared);
                let owned_key = key.to_owned();
                let scheduled = self.pool.submit(async move {
                    let _guard = guard;
                    shared
                        .refresh_once_async(&owned_key, options, producer)
                        .await;
                });
                log_scheduled(key, scheduled);
            }
            return Ok(cached);
        }

        debug!(key, "cache miss, computing");
        let value = producer().await.map_err(CacheError::producer)?;
        self.shared.store_result(key, &value, options);
        self.shared.record_compute(&metadata, options);
        Ok(value)
    }

    /// Whether a background refresh is currently scheduled or running for `key`.
    pub fn is_refreshing(&self, key: &str) -> bool {
        self.shared
            .metadata
            .get(key)
            .is_some_and(|metadata| metadata.is_refreshing())
    }

    /// Refresh bookkeeping for `key`, if it has been read through a refresh variant.
    pub fn metadata(&self, key: &str) -> Option<Arc<KeyMetadata>> {
        self.shared.metadata.get(key)
    }
}

// A rejected job drops its guard, so the flag is already clear again.
fn log_scheduled(key: &str, scheduled: std::result::Result<(), RefreshError>) {
    match scheduled {
        Ok(()) => debug!(key, "scheduled background refresh"),
        Err(err) => warn!(key, error = %err, "background refresh not scheduled"),
    }
}
