//! Per-session mutual exclusion
//!
//! Mutations of one session run one at a time inside this process. Lock
//! entries are created on demand and dropped again when the last holder
//! releases, so the map only tracks sessions with work in progress.

use dashmap::DashMap;
use sopflow_core::SessionId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutex per session id
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    /// Create empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`
    pub async fn acquire(&self, id: &SessionId) -> SessionGuard<'_> {
        // Clone out of the map so no shard lock is held across the await.
        let lock = self.locks.entry(id.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        SessionGuard {
            locks: self,
            id: id.clone(),
            _guard: guard,
        }
    }

    /// Sessions currently locked or awaited
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no session is locked or awaited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one session, released on drop
#[derive(Debug)]
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    id: SessionId,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // Map + this guard: nobody else is waiting, so the entry can go.
        self.locks
            .locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 2);
    }
}
