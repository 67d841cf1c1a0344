//! Bounded concurrency gate.
//!
//! Admits at most `limit` operations at a time. Waiters are served in
//! submission order (the underlying `tokio::sync::Semaphore` is fair), and the
//! slot is released when the operation's future completes, whatever its output.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default cap for outbound network calls.
pub const NETWORK_LIMIT: usize = 32;

/// Default cap for filesystem extraction.
pub const FILE_LIMIT: usize = 16;

/// Counting admission gate. Clones share the same slots.
#[derive(Debug, Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Gate {
    /// Create a gate admitting `limit` concurrent operations (at least one).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Run `op` once a slot is free.
    pub async fn acquire<F, T>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is owned here and never closed.
        let _permit = self.permits.acquire().await.ok();
        op.await
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_peak_never_exceeds_limit() {
        let gate = Gate::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let ops = (0..20u64).map(|i| {
            let gate = gate.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            async move {
                gate.acquire(async {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10 + (i % 4) * 5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }
        });
        join_all(ops).await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_served_in_submission_order() {
        let gate = Gate::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let ops = (0..5).map(|i| {
            let gate = gate.clone();
            let order = Arc::clone(&order);
            async move {
                gate.acquire(async {
                    order.lock().unwrap().push(i);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                })
                .await;
            }
        });
        join_all(ops).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failure_releases_slot() {
        let gate = Gate::new(1);
        let failed: Result<(), &str> = gate.acquire(async { Err("boom") }).await;
        assert!(failed.is_err());
        assert_eq!(gate.available(), 1);

        let ok = gate.acquire(async { 7 }).await;
        assert_eq!(ok, 7);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(Gate::new(0).limit(), 1);
    }
}
