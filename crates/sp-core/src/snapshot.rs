//! Atomically replaceable snapshots.
//!
//! Configuration is read on every inbound message and replaced wholesale on
//! reload. Readers clone an `Arc` under a short read lock and keep using it
//! for the whole exchange, so a reload never waits for in-flight validations
//! and never changes trust material underneath one.

use std::sync::Arc;

use parking_lot::RwLock;

/// Holder of the current value of `T`.
#[derive(Debug)]
pub struct SnapshotHandle<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotHandle<T> {
    /// Creates a handle holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the snapshot and returns the previous one.
    pub fn replace(&self, value: T) -> Arc<T> {
        std::mem::replace(&mut *self.current.write(), Arc::new(value))
    }
}
