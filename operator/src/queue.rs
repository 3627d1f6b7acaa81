use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use reconciler::TargetRef;

/// What woke the dispatcher up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Target(TargetRef),
    /// Re-check every target of the addon.
    Resync,
}

/// Coalesces triggers so that each target has at most one pass waiting behind
/// the one in flight, and tracks retry attempts for the requeue backoff.
#[derive(Default)]
pub struct WorkQueue {
    queued: Mutex<HashSet<TargetRef>>,
    failures: Mutex<HashMap<TargetRef, u32>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        WorkQueue::default()
    }

    /// Returns false when a pass for the target is already waiting.
    pub fn enqueue(&self, target: &TargetRef) -> bool {
        lock(&self.queued).insert(target.clone())
    }

    /// Called as the waiting pass starts; triggers from now on queue another one.
    pub fn start(&self, target: &TargetRef) {
        lock(&self.queued).remove(target);
    }

    pub fn succeeded(&self, target: &TargetRef) {
        lock(&self.failures).remove(target);
    }

    /// Records a transient failure and returns how long to wait before retrying.
    pub fn failed(&self, target: &TargetRef) -> Duration {
        let mut failures = lock(&self.failures);
        let count = failures.entry(target.clone()).or_insert(0);
        *count += 1;
        requeue_backoff(*count)
    }
}

pub fn requeue_backoff(attempt: u32) -> Duration {
    Duration::from_secs(std::cmp::min(2u64.pow(attempt.min(5)), 60))
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // The guarded sets stay consistent even if a holder panicked
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_enqueue_coalesces_until_start() {
        let queue = WorkQueue::new();
        let target = TargetRef::new("cluster1", "governance-policy-framework");

        assert_eq!(queue.enqueue(&target), true);
        assert_eq!(queue.enqueue(&target), false);
        assert_eq!(
            queue.enqueue(&TargetRef::new("cluster2", "governance-policy-framework")),
            true
        );

        queue.start(&target);
        assert_eq!(queue.enqueue(&target), true);
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let queue = WorkQueue::new();
        let target = TargetRef::new("cluster1", "governance-policy-framework");

        assert_eq!(queue.failed(&target), Duration::from_secs(2));
        assert_eq!(queue.failed(&target), Duration::from_secs(4));
        assert_eq!(queue.failed(&target), Duration::from_secs(8));

        queue.succeeded(&target);
        assert_eq!(queue.failed(&target), Duration::from_secs(2));
    }

    #[test]
    fn test_requeue_backoff_is_capped() {
        assert_eq!(requeue_backoff(5), Duration::from_secs(32));
        assert_eq!(requeue_backoff(9), Duration::from_secs(32));
    }
}
