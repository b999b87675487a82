use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

type NameLock = Arc<tokio::sync::Mutex<()>>;

/// Per-name async locks, created on first use.
///
/// Holding the guard makes a lifecycle transition exclusive for that name;
/// different names never contend.
#[derive(Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, NameLock>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, NameLock>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self.map().entry(name.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the entry for `name` once its mapping is torn down. The entry is
    /// kept if other callers are already waiting on it.
    pub fn release(&self, name: &str, guard: OwnedMutexGuard<()>) {
        let mut map = self.map();
        // One reference in the map, one held by `guard`.
        if map.get(name).is_some_and(|lock| Arc::strong_count(lock) == 2) {
            map.remove(name);
        }
        drop(guard);
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}
