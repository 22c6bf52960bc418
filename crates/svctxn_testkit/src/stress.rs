//! Stress tests for svctxn.
//!
//! These drive transactions from many threads at once: children report
//! from worker threads while the caller commits or rolls back, and
//! listeners are delivered on real executor threads.

use crate::tasks::{Behavior, EventLog, Instruction, RecordingTask};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use svctxn_core::{
    CallOrigin, ChildHandle, CompletionLatch, ControllerConfig, Phase, TransactionController,
};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions run.
    pub total_ops: usize,
    /// Transactions that ended as expected.
    pub successful_ops: usize,
    /// Transactions that ended otherwise or timed out.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Transactions per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total transactions: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} txn/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to run.
    pub transactions: usize,
    /// Children per transaction.
    pub children: usize,
    /// Worker threads reporting for children.
    pub threads: usize,
    /// Roll back every n-th transaction instead of committing; 0 never.
    pub rollback_every: usize,
    /// How long to wait for one transaction to terminate.
    pub timeout: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 100,
            children: 8,
            threads: 4,
            rollback_every: 3,
            timeout: Duration::from_secs(10),
        }
    }
}

impl StressConfig {
    fn expects_rollback(&self, n: usize) -> bool {
        self.rollback_every != 0 && n % self.rollback_every == 0
    }
}

/// Returns true if no task saw commit or rollback before every task had
/// seen validate, and no task saw both commit and rollback.
pub fn two_phase_order_holds(log: &EventLog) -> bool {
    let last_validate = log.last(Instruction::Validate);
    let first_outcome = [log.first(Instruction::Commit), log.first(Instruction::Rollback)]
        .into_iter()
        .flatten()
        .min();
    let ordered = match (last_validate, first_outcome) {
        (Some(v), Some(o)) => v < o,
        _ => true,
    };
    ordered && (log.count(Instruction::Commit) == 0 || log.count(Instruction::Rollback) == 0)
}

/// Runs transactions one after another; for each, worker threads report
/// `execution_finished` concurrently while the caller requests the
/// outcome.
pub fn stress_concurrent_children(config: &StressConfig) -> StressTestResult {
    let controller = TransactionController::new(ControllerConfig::default());
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for n in 0..config.transactions {
        let log = EventLog::new();
        let txn = controller.create();
        let handles: Vec<ChildHandle> = (0..config.children)
            .filter_map(|id| RecordingTask::spawn(&txn, id, &log, Behavior::AutoReply).ok())
            .map(|(_, handle)| handle)
            .collect();

        let workers = spawn_reporters(handles, config.threads);

        let latch = CompletionLatch::new();
        let rollback = config.expects_rollback(n);
        let requested = if rollback {
            txn.rollback(Some(latch.listener()))
        } else {
            txn.commit(Some(latch.listener()))
        };

        for worker in workers {
            worker.join().expect("reporter thread panicked");
        }

        let expected = if rollback {
            Phase::RolledBack
        } else {
            Phase::Committed
        };
        let outcome = latch.wait_timeout(config.timeout);
        if requested.is_ok() && outcome == Some(expected) && two_phase_order_holds(&log) {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs transactions from several threads against one controller.
pub fn stress_parallel_transactions(config: &StressConfig) -> StressTestResult {
    let controller = Arc::new(TransactionController::new(ControllerConfig::default()));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let per_thread = config.transactions / config.threads.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let controller = Arc::clone(&controller);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                for i in 0..per_thread {
                    let n = t * per_thread + i;
                    let log = EventLog::new();
                    let txn = controller.create();
                    let children: Vec<ChildHandle> = (0..config.children)
                        .filter_map(|id| {
                            RecordingTask::spawn(&txn, id, &log, Behavior::AutoReply).ok()
                        })
                        .map(|(_, handle)| handle)
                        .collect();

                    let latch = CompletionLatch::new();
                    let rollback = config.expects_rollback(n);
                    let requested = if rollback {
                        txn.rollback(Some(latch.listener()))
                    } else {
                        txn.commit(Some(latch.listener()))
                    };
                    for child in &children {
                        child.execution_finished(CallOrigin::Background);
                    }

                    let expected = if rollback {
                        Phase::RolledBack
                    } else {
                        Phase::Committed
                    };
                    if requested.is_ok()
                        && latch.wait_timeout(config.timeout) == Some(expected)
                        && two_phase_order_holds(&log)
                    {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

fn spawn_reporters(handles: Vec<ChildHandle>, threads: usize) -> Vec<thread::JoinHandle<()>> {
    let threads = threads.max(1);
    let mut buckets: Vec<Vec<ChildHandle>> = (0..threads).map(|_| Vec::new()).collect();
    for (i, handle) in handles.into_iter().enumerate() {
        buckets[i % threads].push(handle);
    }

    buckets
        .into_iter()
        .map(|bucket| {
            thread::spawn(move || {
                for handle in bucket {
                    handle.execution_finished(CallOrigin::Background);
                }
            })
        })
        .collect()
}
