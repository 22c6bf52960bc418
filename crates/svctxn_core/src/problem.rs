//! Problem reporting and the committability gate.
//!
//! Tasks running under a transaction record problems in the transaction's
//! [`ProblemReport`]. When a commit is requested, the transaction compares
//! the worst severity reported so far against its configured threshold and
//! rolls back instead of committing if the threshold was exceeded.

use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;

/// Severity of a reported problem, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Severity {
    /// Informational only.
    #[default]
    Info,
    /// Something unexpected that does not prevent progress.
    Warning,
    /// The operation failed.
    Error,
    /// The operation failed and left things in a bad state.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// How bad it is.
    pub severity: Severity,
    /// Human readable description.
    pub message: String,
}

impl Problem {
    /// Creates a new problem.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Thread-safe, append-only collection of problems.
#[derive(Debug, Default)]
pub struct ProblemReport {
    problems: Mutex<Vec<Problem>>,
}

impl ProblemReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a problem to the report.
    pub fn add(&self, problem: Problem) {
        self.problems.lock().push(problem);
    }

    /// Adds a problem built from a severity and message.
    pub fn report(&self, severity: Severity, message: impl Into<String>) {
        self.add(Problem::new(severity, message));
    }

    /// Returns the worst severity reported so far, or [`Severity::Info`]
    /// for an empty report.
    pub fn max_severity(&self) -> Severity {
        self.problems
            .lock()
            .iter()
            .map(|p| p.severity)
            .max()
            .unwrap_or_default()
    }

    /// Returns a snapshot of all problems in reporting order.
    pub fn problems(&self) -> Vec<Problem> {
        self.problems.lock().clone()
    }

    /// Returns the number of problems.
    pub fn len(&self) -> usize {
        self.problems.lock().len()
    }

    /// Returns true if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.problems.lock().is_empty()
    }
}

/// Returns true if a report is within the given severity threshold.
pub fn is_committable(report: &ProblemReport, threshold: Severity) -> bool {
    report.max_severity() <= threshold
}
