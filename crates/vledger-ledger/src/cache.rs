//! # TTL Cache
//!
//! A small read-through cache for derived views such as the vendor
//! summary listing. Entries expire after a fixed time-to-live and are also
//! invalidated explicitly: the ledger store drops every key under a
//! vendor's prefix whenever that vendor's state changes, so a cached view
//! is never older than the last committed write.
//!
//! A read-through fill computes outside any vendor lock, so a write can
//! commit while the fill is in flight. Every invalidation bumps a
//! generation counter, and a fill only stores its value if no
//! invalidation happened since it started.
//!
//! The cache is an injected service. Nothing in the engine depends on it
//! for correctness of admission checks; those always read live state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Explicit invalidation hook, implemented by every cache the ledger
/// store notifies on commit.
pub trait CacheInvalidation: Send + Sync {
    /// Drop every key starting with `prefix`, returning how many were
    /// removed.
    fn invalidate_prefix(&self, prefix: &str) -> usize;
}

/// Key prefix under which everything derived from one vendor is cached.
pub fn vendor_prefix(vendor_id: &impl std::fmt::Display) -> String {
    format!("vendor:{vendor_id}:")
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe string-keyed cache with per-entry expiry.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    max_entries: usize,
    slots: RwLock<HashMap<String, Slot<V>>>,
    /// Bumped under the `slots` write lock by every invalidation.
    generation: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            slots: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, if present and unexpired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let slots = self.slots.read();
        slots
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.value.clone())
    }

    /// Insert or replace a value.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let mut slots = self.slots.write();
        self.store(&mut slots, key.into(), value);
    }

    fn store(&self, slots: &mut HashMap<String, Slot<V>>, key: String, value: V) {
        let now = Instant::now();
        if slots.len() >= self.max_entries {
            slots.retain(|_, slot| slot.expires_at > now);
        }
        if slots.len() >= self.max_entries {
            // Still full of live entries: start over rather than grow.
            slots.clear();
        }
        slots.insert(
            key,
            Slot {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Return the cached value or compute, store, and return a fresh one.
    ///
    /// The computed value is returned either way, but it is only stored
    /// when no invalidation ran while `compute` was executing.
    pub fn get_or_try_insert<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let started = self.generation.load(Ordering::SeqCst);
        let value = compute()?;
        let mut slots = self.slots.write();
        if self.generation.load(Ordering::SeqCst) == started {
            self.store(&mut slots, key.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Drop one key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slots = self.slots.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        slots.remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut slots = self.slots.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        slots.clear();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Send + Sync> CacheInvalidation for TtlCache<V> {
    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut slots = self.slots.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = slots.len();
        slots.retain(|key, _| !key.starts_with(prefix));
        before - slots.len()
    }
}
