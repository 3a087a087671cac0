//! Per-pub mutual exclusion.
//!
//! Two moves of the same pub are serialised; moves of different pubs never
//! wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PubLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl PubLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `pub_id`. Access ends when the guard drops.
    pub async fn acquire(&self, pub_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on, so the map tracks only
            // pubs currently being mutated.
            map.retain(|id, l| *id == pub_id || Arc::strong_count(l) > 1);
            map.entry(pub_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
