//! Simulate command implementation.
//!
//! Runs one transaction whose children are driven by worker threads, the
//! way service tasks would be, and prints how it ended.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use svctxn_core::{
    CallOrigin, ChildHandle, CompletionLatch, ControllerConfig, Severity, StatsSnapshot,
    TaskChild, TransactionController, TransactionSnapshot, TxnConfig,
};
use thiserror::Error;
use tracing::{debug, info};

/// Errors specific to a simulation run.
#[derive(Debug, Error)]
pub enum SimulateError {
    /// A severity argument could not be parsed.
    #[error("invalid severity: {0}")]
    InvalidSeverity(String),

    /// The transaction did not terminate in time.
    #[error("transaction did not terminate within {waited_ms} ms")]
    Timeout {
        /// How long we waited.
        waited_ms: u64,
    },
}

/// Parameters of a simulation.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of children.
    pub children: usize,
    /// Worker threads driving the children.
    pub workers: usize,
    /// Request a rollback instead of a commit.
    pub rollback: bool,
    /// Problem reported by the first child, if any.
    pub severity: Option<String>,
    /// Commit threshold.
    pub threshold: String,
    /// How long to wait for the outcome.
    pub timeout: Duration,
}

/// Instruction counts across all children.
#[derive(Debug, Default, Serialize)]
pub struct InstructionCounts {
    /// `begin_validate` calls.
    pub validate: usize,
    /// `begin_commit` calls.
    pub commit: usize,
    /// `begin_rollback` calls.
    pub rollback: usize,
}

/// A problem as reported.
#[derive(Debug, Serialize)]
pub struct ProblemInfo {
    /// Severity.
    pub severity: Severity,
    /// Message.
    pub message: String,
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// What the caller asked for.
    pub requested: &'static str,
    /// Commit threshold in effect.
    pub threshold: Severity,
    /// Final transaction state.
    pub transaction: TransactionSnapshot,
    /// Wall time from creation to termination.
    pub duration_ms: u64,
    /// Instructions delivered to children.
    pub instructions: InstructionCounts,
    /// Problems reported during the run.
    pub problems: Vec<ProblemInfo>,
    /// Controller statistics.
    pub stats: StatsSnapshot,
}

#[derive(Default)]
struct Counters {
    validate: AtomicUsize,
    commit: AtomicUsize,
    rollback: AtomicUsize,
}

/// A child that answers every instruction as soon as it arrives.
struct WorkerTask {
    index: usize,
    counters: Arc<Counters>,
    handle: Mutex<Option<ChildHandle>>,
}

impl WorkerTask {
    fn reply(&self, terminate: bool) {
        let handle = self.handle.lock().clone();
        let Some(handle) = handle else {
            return;
        };
        if terminate {
            handle.terminated(CallOrigin::Background);
        } else {
            handle.validation_finished(CallOrigin::Background);
        }
    }
}

impl TaskChild for WorkerTask {
    fn begin_validate(&self, origin: CallOrigin) {
        debug!(child = self.index, %origin, "validate");
        self.counters.validate.fetch_add(1, Ordering::Relaxed);
        self.reply(false);
    }

    fn begin_commit(&self, origin: CallOrigin) {
        debug!(child = self.index, %origin, "commit");
        self.counters.commit.fetch_add(1, Ordering::Relaxed);
        self.reply(true);
    }

    fn begin_rollback(&self, origin: CallOrigin) {
        debug!(child = self.index, %origin, "rollback");
        self.counters.rollback.fetch_add(1, Ordering::Relaxed);
        self.reply(true);
    }
}

fn parse_severity(s: &str) -> Result<Severity, SimulateError> {
    s.parse().map_err(SimulateError::InvalidSeverity)
}

/// Runs a simulation and returns its result.
pub fn simulate(options: &SimulateOptions) -> Result<SimulateResult, Box<dyn std::error::Error>> {
    let threshold = parse_severity(&options.threshold)?;
    let problem = options.severity.as_deref().map(parse_severity).transpose()?;

    let config = ControllerConfig::new()
        .thread_name("svctxn-sim")
        .transaction(TxnConfig::new().max_severity(threshold).label("simulate"));
    let controller = TransactionController::new(config);
    let txn = controller.create();
    let counters = Arc::new(Counters::default());

    let mut handles = Vec::with_capacity(options.children);
    for index in 0..options.children {
        let task = Arc::new(WorkerTask {
            index,
            counters: Arc::clone(&counters),
            handle: Mutex::new(None),
        });
        let child: Arc<dyn TaskChild> = task.clone();
        let handle = txn.add_child(child, CallOrigin::User)?;
        *task.handle.lock() = Some(handle.clone());
        handles.push(handle);
    }
    info!(
        txn = %txn.id(),
        children = options.children,
        workers = options.workers,
        "starting simulation"
    );

    // Spread children over the workers; each worker "executes" its
    // children and reports them finished.
    let workers = options.workers.max(1);
    let mut buckets: Vec<Vec<ChildHandle>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, handle) in handles.into_iter().enumerate() {
        buckets[i % workers].push(handle);
    }
    let report = txn.handle();
    let joins: Vec<_> = buckets
        .into_iter()
        .enumerate()
        .map(|(worker, bucket)| {
            let report = report.clone();
            thread::Builder::new()
                .name(format!("svctxn-worker-{worker}"))
                .spawn(move || {
                    for child in bucket {
                        if let (Some(severity), 0) = (problem, child.index()) {
                            let message = format!("child {} reported a problem", child.index());
                            report.problem_report().report(severity, message);
                        }
                        child.execution_finished(CallOrigin::Background);
                    }
                })
        })
        .collect::<Result<_, _>>()?;

    let latch = CompletionLatch::new();
    let requested = if options.rollback {
        txn.rollback(Some(latch.listener()))?;
        "rollback"
    } else {
        txn.commit(Some(latch.listener()))?;
        "commit"
    };

    for join in joins {
        if join.join().is_err() {
            return Err("worker thread panicked".into());
        }
    }

    if latch.wait_timeout(options.timeout).is_none() {
        return Err(SimulateError::Timeout {
            waited_ms: options.timeout.as_millis() as u64,
        }
        .into());
    }

    let problems = txn
        .problem_report()
        .problems()
        .into_iter()
        .map(|p| ProblemInfo {
            severity: p.severity,
            message: p.message,
        })
        .collect();

    Ok(SimulateResult {
        requested,
        threshold,
        transaction: txn.snapshot(),
        duration_ms: txn.duration().as_millis() as u64,
        instructions: InstructionCounts {
            validate: counters.validate.load(Ordering::Relaxed),
            commit: counters.commit.load(Ordering::Relaxed),
            rollback: counters.rollback.load(Ordering::Relaxed),
        },
        problems,
        stats: controller.stats().snapshot(),
    })
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = simulate(options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &SimulateResult) {
    let txn = &result.transaction;
    println!("Transaction {}", txn.id);
    println!("  Requested:   {}", result.requested);
    println!("  Outcome:     {}", txn.phase);
    println!("  Threshold:   {}", result.threshold);
    println!("  Children:    {}", txn.children);
    println!("  Duration:    {} ms", result.duration_ms);
    println!();
    println!("Instructions:");
    println!("  validate:    {}", result.instructions.validate);
    println!("  commit:      {}", result.instructions.commit);
    println!("  rollback:    {}", result.instructions.rollback);

    if !result.problems.is_empty() {
        println!();
        println!("Problems:");
        for problem in &result.problems {
            println!("  [{}] {}", problem.severity, problem.message);
        }
    }

    println!();
    println!("Controller:");
    println!("  created:     {}", result.stats.created);
    println!("  committed:   {}", result.stats.committed);
    println!("  rolled back: {}", result.stats.rolled_back);
}

#[cfg(test)]
mod tests {
    use super::*;
    use svctxn_core::Phase;

    fn options(children: usize, workers: usize) -> SimulateOptions {
        SimulateOptions {
            children,
            workers,
            rollback: false,
            severity: None,
            threshold: "warning".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn commit_reaches_every_child() {
        let result = simulate(&options(5, 2)).unwrap();

        assert_eq!(result.transaction.phase, Phase::Committed);
        assert_eq!(result.instructions.validate, 5);
        assert_eq!(result.instructions.commit, 5);
        assert_eq!(result.instructions.rollback, 0);
        assert_eq!(result.stats.committed, 1);
    }

    #[test]
    fn rollback_request_rolls_back() {
        let mut opts = options(3, 3);
        opts.rollback = true;

        let result = simulate(&opts).unwrap();

        assert_eq!(result.transaction.phase, Phase::RolledBack);
        assert_eq!(result.instructions.commit, 0);
        assert_eq!(result.instructions.rollback, 3);
    }

    #[test]
    fn severe_problem_vetoes_commit() {
        let mut opts = options(2, 1);
        opts.severity = Some("error".to_string());

        let result = simulate(&opts).unwrap();

        assert_eq!(result.transaction.phase, Phase::RolledBack);
        assert_eq!(result.problems.len(), 1);
        assert_eq!(result.instructions.validate, 2);
    }

    #[test]
    fn zero_children_commits() {
        let result = simulate(&options(0, 4)).unwrap();
        assert_eq!(result.transaction.phase, Phase::Committed);
    }

    #[test]
    fn bad_severity_is_rejected() {
        let mut opts = options(1, 1);
        opts.threshold = "loud".to_string();
        assert!(simulate(&opts).is_err());
    }

    #[test]
    fn result_serializes() {
        let result = simulate(&options(1, 1)).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["requested"], "commit");
        assert_eq!(json["transaction"]["phase"], "Committed");
    }
}
