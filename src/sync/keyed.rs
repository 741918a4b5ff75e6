//! Per-alert-id lock registry.
//!
//! The alert source gives no ordering or mutual-exclusion guarantee, so the
//! engine serializes all transitions for one alert id itself. Different ids
//! run fully in parallel. Entries are never evicted; the registry grows by
//! one small allocation per distinct alert id seen in this process.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// Take the lock for `key`, waiting behind any transition already in
    /// flight for the same key.
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
