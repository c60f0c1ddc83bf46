//! Seen-ID cache for replay detection.
//!
//! An accepted assertion stays usable until its validity window closes, so
//! its ID is remembered until then. Entries past that point are dropped
//! lazily.

use std::time::SystemTime;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Records message or assertion IDs that were already accepted.
pub trait ReplayCache: Send + Sync {
    /// Records `id` until `expires_at`.
    ///
    /// Returns `false` if the ID was already recorded and has not expired.
    fn check_and_insert(&self, id: &str, expires_at: SystemTime) -> CacheResult<bool>;

    /// Drops expired entries and returns how many were removed.
    fn purge_expired(&self) -> usize;
}

/// In-memory [`ReplayCache`].
#[derive(Debug)]
pub struct InMemoryReplayCache {
    seen: DashMap<String, SystemTime>,
    max_entries: usize,
}

impl InMemoryReplayCache {
    /// Default upper bound on remembered IDs.
    pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

    /// Creates an empty cache with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_ENTRIES)
    }

    /// Creates an empty cache remembering at most `max_entries` IDs.
    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            seen: DashMap::new(),
            max_entries,
        }
    }

    /// Returns the number of remembered IDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true if no ID is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for InMemoryReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayCache for InMemoryReplayCache {
    fn check_and_insert(&self, id: &str, expires_at: SystemTime) -> CacheResult<bool> {
        let now = SystemTime::now();
        if self.seen.len() >= self.max_entries && self.purge_expired() == 0 {
            // live IDs are never evicted
            return Err(CacheError::CapacityExceeded(self.max_entries));
        }

        match self.seen.entry(id.to_string()) {
            Entry::Occupied(mut existing) => {
                if *existing.get() > now {
                    debug!(id, "replayed identifier");
                    return Ok(false);
                }
                existing.insert(expires_at);
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
            }
        }
        Ok(true)
    }

    fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.seen.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn in_five_minutes() -> SystemTime {
        SystemTime::now() + Duration::from_secs(300)
    }

    #[test]
    fn second_sighting_is_a_replay() {
        let cache = InMemoryReplayCache::new();
        assert!(cache.check_and_insert("_a1", in_five_minutes()).unwrap());
        assert!(!cache.check_and_insert("_a1", in_five_minutes()).unwrap());
        assert!(cache.check_and_insert("_a2", in_five_minutes()).unwrap());
    }

    #[test]
    fn expired_entries_are_forgotten() {
        let cache = InMemoryReplayCache::new();
        let past = SystemTime::now() - Duration::from_secs(1);
        assert!(cache.check_and_insert("_a1", past).unwrap());
        assert!(cache.check_and_insert("_a1", in_five_minutes()).unwrap());
    }

    #[test]
    fn full_cache_refuses_new_ids() {
        let cache = InMemoryReplayCache::with_capacity(1);
        cache.check_and_insert("_a1", in_five_minutes()).unwrap();
        assert!(cache.check_and_insert("_a2", in_five_minutes()).is_err());
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache = InMemoryReplayCache::new();
        cache
            .check_and_insert("_old", SystemTime::now() - Duration::from_secs(1))
            .unwrap();
        cache.check_and_insert("_new", in_five_minutes()).unwrap();
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
