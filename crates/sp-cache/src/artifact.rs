//! Artifact store.
//!
//! The Artifact binding sends the browser away with a short reference and
//! keeps the signed message server-side until the peer resolves it over the
//! back channel.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Key-value store for pending artifact documents.
///
/// Keys are the base64 artifact strings. Implementations must tolerate
/// concurrent inserts and lookups from many request handlers.
pub trait ArtifactStore: Send + Sync {
    /// Stores `document` under `artifact` for at most `ttl`.
    ///
    /// Fails with [`CacheError::AlreadyExists`] if an unexpired entry exists.
    fn insert(&self, artifact: &str, document: String, ttl: Duration) -> CacheResult<()>;

    /// Looks up an unexpired document, removing it when `consume` is set.
    fn get(&self, artifact: &str, consume: bool) -> CacheResult<Option<String>>;

    /// Looks up and removes a document. A second call returns `None`.
    fn take(&self, artifact: &str) -> CacheResult<Option<String>> {
        self.get(artifact, true)
    }

    /// Drops expired entries and returns how many were removed.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug)]
struct PendingDocument {
    document: String,
    expires_at: Instant,
}

impl PendingDocument {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory [`ArtifactStore`] on a sharded concurrent map.
#[derive(Debug)]
pub struct InMemoryArtifactStore {
    entries: DashMap<String, PendingDocument>,
    max_entries: usize,
}

impl InMemoryArtifactStore {
    /// Default upper bound on pending artifacts.
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

    /// Creates an empty store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_ENTRIES)
    }

    /// Creates an empty store holding at most `max_entries` documents.
    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Returns the number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn insert(&self, artifact: &str, document: String, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        if self.entries.len() >= self.max_entries && self.purge_expired() == 0 {
            return Err(CacheError::CapacityExceeded(self.max_entries));
        }

        let pending = PendingDocument {
            document,
            expires_at: now + ttl,
        };
        match self.entries.entry(artifact.to_string()) {
            Entry::Occupied(mut existing) => {
                if !existing.get().is_expired(now) {
                    return Err(CacheError::AlreadyExists(artifact.to_string()));
                }
                existing.insert(pending);
            }
            Entry::Vacant(slot) => {
                slot.insert(pending);
            }
        }
        debug!(ttl_secs = ttl.as_secs(), "artifact stored");
        Ok(())
    }

    fn get(&self, artifact: &str, consume: bool) -> CacheResult<Option<String>> {
        let now = Instant::now();
        if consume {
            return Ok(self
                .entries
                .remove(artifact)
                .filter(|(_, pending)| !pending.is_expired(now))
                .map(|(_, pending)| pending.document));
        }

        Ok(self
            .entries
            .get(artifact)
            .filter(|pending| !pending.is_expired(now))
            .map(|pending| pending.document.clone()))
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, pending| !pending.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}
