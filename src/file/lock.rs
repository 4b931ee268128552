//! Per-record advisory locks.
//!
//! Update and delete on the same id are serialized; different ids proceed in
//! parallel. Entries are dropped from the map once nobody holds or waits on
//! them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct IdLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: i64) -> IdGuard<'_> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(id).or_default().clone()
        };
        let guard = entry.clone().lock_owned().await;

        IdGuard {
            locks: self,
            id,
            entry,
            guard: Some(guard),
        }
    }

    /// Number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while an id is locked.
pub struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: i64,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(&self.entry) == 2 {
            map.remove(&self.id);
        }
    }
}
