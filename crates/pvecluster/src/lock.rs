//! Single-writer discipline per anchor.
//!
//! Two runs that both see an unclustered anchor can both decide to create
//! the cluster, and a join against an anchor whose cluster is still
//! converging can fail spuriously. Runs sharing an [`AnchorLocks`] take the
//! anchor's lock before they probe and hold it until verification is done.
//!
//! This only serializes runs inside one process. Separate processes
//! targeting the same anchor must still be serialized by the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::types::Endpoint;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Registry of per-anchor async locks. Cheap to clone; clones share locks.
///
/// An anchor's entry lives only while some run holds or waits for it.
#[derive(Clone, Default)]
pub struct AnchorLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Held while a run mutates the cluster rooted at one anchor.
pub struct AnchorGuard {
    anchor: String,
    key: String,
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AnchorGuard {
    pub fn anchor(&self) -> &str {
        &self.anchor
    }
}

impl Drop for AnchorGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Waiters cloned the lock under the map lock, so a count of one
        // means only the map itself still refers to it.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
        debug!(anchor = %self.anchor, "released anchor lock");
    }
}

impl AnchorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `anchor`.
    pub async fn acquire(&self, anchor: &Endpoint) -> AnchorGuard {
        let key = anchor.identity();
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        let guard = lock.lock_owned().await;
        debug!(anchor = %anchor, "acquired anchor lock");
        AnchorGuard {
            anchor: anchor.host().to_string(),
            key,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of anchors currently held or waited for.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
