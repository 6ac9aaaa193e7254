//! Expiring key-value storage behind the cache.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::clock::{Clock, SystemClock};

/// Represents a value with an expiration time
#[derive(Debug, Clone)]
pub struct Expiring<T> {
    pub expires_at: Instant,
    pub value: T,
}

impl<T> Expiring<T> {
    /// Creates a new expiring value
    pub fn new(value: T, expires_at: Instant) -> Self {
        Self { expires_at, value }
    }

    /// Checks if this item has expired as of `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Upper bound on how far ahead an expiry is placed.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The instant `ttl` after `now`, capped so huge TTLs cannot overflow.
pub(crate) fn expires_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(FAR_FUTURE)).unwrap_or(now)
}

/// A stored value: either a computed result or a cached "no result".
#[derive(Clone)]
pub enum Slot {
    Present(Arc<dyn Any + Send + Sync>),
    Absent,
}

impl Slot {
    pub fn present<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Present(Arc::new(value))
    }

    pub fn from_option<T: Send + Sync + 'static>(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::present)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Reads the slot back as `T`.
    ///
    /// # Panics
    ///
    /// Panics if the slot holds a value of another type. Each key must be
    /// used with a single value type.
    pub fn into_value<T: Clone + 'static>(self, key: &str) -> Option<T> {
        match self {
            Self::Absent => None,
            Self::Present(value) => {
                let any: &(dyn Any + Send + Sync) = &*value;
                match any.downcast_ref::<T>() {
                    Some(value) => Some(value.clone()),
                    None => panic!(
                        "cache key `{key}` holds a value of another type than `{}`",
                        type_name::<T>()
                    ),
                }
            }
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present(_) => f.write_str("Present(..)"),
            Self::Absent => f.write_str("Absent"),
        }
    }
}

/// String-keyed storage where every entry carries an absolute expiry.
///
/// Implementations must be internally synchronized. Eviction of expired
/// entries is the store's business; `get` must never return one.
pub trait ExpiringStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Slot>;

    /// Creates or replaces the entry for `key`.
    fn set(&self, key: &str, slot: Slot, expires_at: Instant);

    fn remove(&self, key: &str);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`ExpiringStore`].
pub struct MemoryStore {
    map: RwLock<HashMap<String, Expiring<Slot>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|_, item| !item.is_expired_at(now));
        before - map.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpiringStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Slot> {
        let now = self.clock.now();
        {
            let map = self.map.read();
            match map.get(key) {
                Some(item) if !item.is_expired_at(now) => return Some(item.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict unless another writer replaced it meanwhile.
        let mut map = self.map.write();
        if map.get(key).is_some_and(|item| item.is_expired_at(now)) {
            map.remove(key);
        }
        None
    }

    fn set(&self, key: &str, slot: Slot, expires_at: Instant) {
        self.map
            .write()
            .insert(key.to_owned(), Expiring::new(slot, expires_at));
    }

    fn remove(&self, key: &str) {
        self.map.write().remove(key);
    }

    fn clear(&self) {
        self.map.write().clear();
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }
}
