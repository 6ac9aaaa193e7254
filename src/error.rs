//! Error types for cache operations.

use thiserror::Error;

/// Boxed error returned by producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias using [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced to callers of the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The producer failed on the synchronous path. Never cached.
    #[error(transparent)]
    Producer(BoxError),
}

impl CacheError {
    pub(crate) fn producer<E: Into<BoxError>>(err: E) -> Self {
        Self::Producer(err.into())
    }

    /// Consumes the error and returns the producer's original error.
    pub fn into_inner(self) -> BoxError {
        match self {
            Self::Producer(err) => err,
        }
    }
}

/// Reasons a background refresh could not be scheduled.
///
/// These never reach callers; the stale value keeps serving and the next
/// hit past the threshold tries again.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Every refresh slot is taken.
    #[error("refresh pool saturated ({limit} refreshes pending)")]
    Saturated { limit: usize },

    /// The background runtime could not be started.
    #[error("failed to start refresh runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
