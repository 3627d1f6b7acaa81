use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::hub::TargetRef;

/// At most one pass in flight per target. Different targets never wait on each other.
#[derive(Default)]
pub struct TargetLocks {
    locks: Mutex<HashMap<TargetRef, Arc<Mutex<()>>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, target: &TargetRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(target.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops the entry of a target nobody holds anymore.
    pub async fn forget(&self, target: &TargetRef) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(target) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(target);
            }
        }
    }
}
