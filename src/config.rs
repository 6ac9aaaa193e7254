//! Cache configuration and per-call options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TTL used when a call does not specify one.
pub const DEFAULT_TTL: Duration = Duration::from_millis(1000);

/// Entries with a TTL at or below this are never refreshed ahead of expiry.
pub const MIN_REFRESH_TTL: Duration = Duration::from_millis(500);

/// Fraction of the TTL that must elapse before a hit triggers a refresh.
pub const REFRESH_THRESHOLD: f64 = 0.8;

/// Configuration of the background refresh pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Worker threads running background refreshes
    pub refresh_workers: usize,
    /// Maximum number of refreshes queued or running at once
    pub max_pending_refreshes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_workers: 4,
            max_pending_refreshes: 256,
        }
    }
}

/// Options for a single get-or-compute call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheOptions {
    /// How long a computed result stays valid
    pub ttl: Duration,
    /// Whether a producer returning `None` is cached as such
    pub cache_absence: bool,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_ttl_ms(self, millis: u64) -> Self {
        self.with_ttl(Duration::from_millis(millis))
    }

    pub fn cache_absence(mut self, cache_absence: bool) -> Self {
        self.cache_absence = cache_absence;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            cache_absence: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CacheOptions::default();
        assert_eq!(options.ttl, Duration::from_millis(1000));
        assert!(!options.cache_absence);
    }

    #[test]
    fn test_options_builders() {
        let options = CacheOptions::new().with_ttl_ms(400).cache_absence(true);
        assert_eq!(options.ttl, Duration::from_millis(400));
        assert!(options.cache_absence);
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: CacheConfig = serde_json::from_str(r#"{"refresh_workers": 2}"#).unwrap();
        assert_eq!(config.refresh_workers, 2);
        assert_eq!(config.max_pending_refreshes, 256);
    }
}
