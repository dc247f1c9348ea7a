//! Per-resource async locks
//!
//! Version numbers, message ids and read-modify-write edits are serialized
//! per document, log or file. Unrelated resources never share a lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries are pruned once the map grows past this many keys
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of one mutex per resource key
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl LockRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`
    pub async fn acquire(&self, key: &Path) -> OwnedMutexGuard<()> {
        if self.locks.len() > PRUNE_THRESHOLD {
            self.prune();
        }
        let lock = self
            .locks
            .entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops locks nobody holds or waits on
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
