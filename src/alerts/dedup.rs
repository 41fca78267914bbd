//! Alert deduplication guard
//!
//! Remembers every dedup key that has been dispatched so the same condition
//! instance is never notified twice in the life of the process. By default
//! the key set is unbounded; with a retention window keys are forgotten after
//! that long, bounding memory on very long uptimes.

use std::time::Duration;

use fxhash::FxHashSet;
use moka::sync::Cache;

/// Upper bound on retained keys when a retention window is configured
const MAX_RETAINED_KEYS: u64 = 1_000_000;

/// moka rejects a time-to-live over 1000 years
const MAX_RETENTION: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

enum KeySet {
    Unbounded(FxHashSet<String>),
    Expiring(Cache<String, ()>),
}

pub struct DedupGuard {
    keys: KeySet,
}

impl DedupGuard {
    /// Guard that never forgets a key
    pub fn new() -> Self {
        Self {
            keys: KeySet::Unbounded(FxHashSet::default()),
        }
    }

    /// Guard that forgets keys `retention` after they were first seen.
    /// Retention is capped at 100 years.
    pub fn with_retention(retention: Duration) -> Self {
        if retention > MAX_RETENTION {
            tracing::warn!(?retention, "Dedup retention too long, clamping to 100 years");
        }
        let retention = retention.min(MAX_RETENTION);
        let cache: Cache<String, ()> = Cache::builder()
            .max_capacity(MAX_RETAINED_KEYS)
            .time_to_live(retention)
            .build();
        Self {
            keys: KeySet::Expiring(cache),
        }
    }

    /// Record `key`; true if it had not been seen (and should be dispatched)
    pub fn first_seen(&mut self, key: &str) -> bool {
        match &mut self.keys {
            KeySet::Unbounded(set) => {
                if set.contains(key) {
                    false
                } else {
                    set.insert(key.to_string());
                    true
                }
            }
            KeySet::Expiring(cache) => {
                if cache.contains_key(key) {
                    false
                } else {
                    cache.insert(key.to_string(), ());
                    true
                }
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        match &self.keys {
            KeySet::Unbounded(set) => set.contains(key),
            KeySet::Expiring(cache) => cache.contains_key(key),
        }
    }

    /// Number of keys currently remembered
    pub fn len(&self) -> usize {
        match &self.keys {
            KeySet::Unbounded(set) => set.len(),
            KeySet::Expiring(cache) => {
                cache.run_pending_tasks();
                cache.entry_count() as usize
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self.keys, KeySet::Expiring(_))
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new()
    }
}
