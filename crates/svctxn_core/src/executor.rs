//! Executors for asynchronous listener delivery.

use crate::error::ExecuteError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// A unit of fire-and-forget work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Accepts fire-and-forget work items.
///
/// Transactions only use the executor to deliver completion listeners
/// when the triggering call came from a caller thread.
pub trait Executor: Send + Sync {
    /// Hands a job to the executor. Errors mean the job will never run.
    fn execute(&self, job: Job) -> Result<(), ExecuteError>;
}

/// Runs every job on a freshly spawned, named OS thread.
#[derive(Debug)]
pub struct ThreadExecutor {
    name: String,
    spawned: AtomicU64,
}

impl ThreadExecutor {
    /// Creates an executor whose threads are named `<name>-<n>`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spawned: AtomicU64::new(0),
        }
    }

    /// Returns the number of threads spawned so far.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new("svctxn-listener")
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, job: Job) -> Result<(), ExecuteError> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("{}-{}", self.name, n))
            .spawn(job)?;
        Ok(())
    }
}
