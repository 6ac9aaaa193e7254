//! A process-wide cache shared by every caller.
//!
//! The free functions here delegate to a lazily created [`MemoCache`] that
//! lives until the process exits. Tests should call [`reset`] between
//! cases.

use std::future::Future;
use std::sync::OnceLock;

use crate::cache::MemoCache;
use crate::config::CacheOptions;
use crate::error::{BoxError, Result};

static GLOBAL: OnceLock<MemoCache> = OnceLock::new();

/// The shared cache instance.
pub fn global() -> &'static MemoCache {
    GLOBAL.get_or_init(MemoCache::new)
}

/// See [`MemoCache::get_or_compute`].
pub fn get_or_compute<T, F, E>(key: &str, options: CacheOptions, producer: F) -> Result<Option<T>>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> std::result::Result<Option<T>, E>,
    E: Into<BoxError>,
{
    global().get_or_compute(key, options, producer)
}

/// See [`MemoCache::get_or_compute_async`].
pub async fn get_or_compute_async<T, F, Fut, E>(
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
    global().get_or_compute_async(key, options, producer).await
}

/// See [`MemoCache::get_or_compute_with_refresh`].
pub fn get_or_compute_with_refresh<T, F, E>(
    key: &str,
    options: CacheOptions,
    producer: F,
) -> Result<Option<T>>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> std::result::Result<Option<T>, E> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    global().get_or_compute_with_refresh(key, options, producer)
}

/// See [`MemoCache::get_or_compute_with_refresh_async`].
pub async fn get_or_compute_with_refresh_async<T, F, Fut, E>(
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
    global()
        .get_or_compute_with_refresh_async(key, options, producer)
        .await
}

pub fn remove(key: &str) {
    global().remove(key);
}

/// Clears the shared store and all refresh metadata.
pub fn reset() {
    global().reset();
}
