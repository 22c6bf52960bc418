//! Transaction statistics.
//!
//! Counters shared by every transaction a controller creates.
//!
//! # Usage
//!
//! ```rust,ignore
//! let controller = TransactionController::new(ControllerConfig::default());
//! let txn = controller.create();
//! txn.commit(None)?;
//!
//! let stats = controller.stats().snapshot();
//! println!("Committed: {}", stats.committed);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction outcome and failure counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct TransactionStats {
    /// Transactions created.
    created: AtomicU64,
    /// Transactions that reached the committed phase.
    committed: AtomicU64,
    /// Transactions that reached the rolled back phase.
    rolled_back: AtomicU64,
    /// Completion listeners that panicked.
    listener_failures: AtomicU64,
    /// Listeners the executor refused to run.
    executor_failures: AtomicU64,
}

impl TransactionStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_listener_failure(&self) {
        self.listener_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executor_failure(&self) {
        self.executor_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of transactions created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions committed.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions rolled back.
    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }

    /// Returns the number of panicking listeners.
    pub fn listener_failures(&self) -> u64 {
        self.listener_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of listeners the executor refused.
    pub fn executor_failures(&self) -> u64 {
        self.executor_failures.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            created: self.created(),
            committed: self.committed(),
            rolled_back: self.rolled_back(),
            listener_failures: self.listener_failures(),
            executor_failures: self.executor_failures(),
        }
    }
}

/// A point-in-time copy of [`TransactionStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatsSnapshot {
    /// Transactions created.
    pub created: u64,
    /// Transactions committed.
    pub committed: u64,
    /// Transactions rolled back.
    pub rolled_back: u64,
    /// Panicking listeners.
    pub listener_failures: u64,
    /// Listeners refused by the executor.
    pub executor_failures: u64,
}

impl StatsSnapshot {
    /// Transactions created but not yet terminated.
    pub fn in_flight(&self) -> u64 {
        self.created
            .saturating_sub(self.committed + self.rolled_back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = TransactionStats::new();
        assert_eq!(stats.created(), 0);
        assert_eq!(stats.committed(), 0);
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn snapshot_and_in_flight() {
        let stats = TransactionStats::new();
        for _ in 0..3 {
            stats.record_created();
        }
        stats.record_committed();
        stats.record_rolled_back();
        stats.record_listener_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.created, 3);
        assert_eq!(snap.committed, 1);
        assert_eq!(snap.rolled_back, 1);
        assert_eq!(snap.listener_failures, 1);
        assert_eq!(snap.in_flight(), 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(TransactionStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_created();
                    s.record_committed();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.created(), 1000);
        assert_eq!(stats.committed(), 1000);
    }
}
