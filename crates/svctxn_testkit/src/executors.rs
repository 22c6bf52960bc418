//! Executors with deterministic delivery for tests.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use svctxn_core::{ExecuteError, Executor, Job};

/// Holds jobs until the test asks for them to run.
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<VecDeque<Job>>,
    executed: AtomicUsize,
}

impl ManualExecutor {
    /// Creates an empty executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Number of jobs run so far.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Runs the oldest job. Returns false if none was queued.
    pub fn run_next(&self) -> bool {
        // Pop before running; jobs may queue more jobs.
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                self.executed.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Runs jobs until the queue is empty, including jobs queued by
    /// jobs. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut n = 0;
        while self.run_next() {
            n += 1;
        }
        n
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecuteError> {
        self.jobs.lock().push_back(job);
        Ok(())
    }
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .field("executed", &self.executed())
            .finish()
    }
}

/// Runs every job on the submitting thread.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecuteError> {
        job();
        Ok(())
    }
}

/// Refuses every job, like an executor that has been shut down.
#[derive(Debug, Default)]
pub struct RejectingExecutor {
    rejected: AtomicUsize,
}

impl RejectingExecutor {
    /// Creates a rejecting executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs refused.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl Executor for RejectingExecutor {
    fn execute(&self, _job: Job) -> Result<(), ExecuteError> {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        Err(ExecuteError::rejected("executor is shut down"))
    }
}
