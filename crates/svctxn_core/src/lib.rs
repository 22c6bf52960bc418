//! # svctxn Core
//!
//! Two-phase transaction engine for coordinating concurrently running
//! service tasks.
//!
//! This crate provides:
//! - A lock-protected phase machine driven by caller requests and child reports
//! - Exactly-once completion listeners, delivered inline or through an executor
//! - A severity-gated problem report that can veto a commit
//! - A registry of live transactions with deadlock-checked waiting
//!
//! # Example
//!
//! ```rust,ignore
//! use svctxn_core::{CallOrigin, ControllerConfig, CompletionLatch, TransactionController};
//!
//! let controller = TransactionController::new(ControllerConfig::default());
//! let txn = controller.create();
//! let child = txn.add_child(task, CallOrigin::User)?;
//!
//! let latch = CompletionLatch::new();
//! txn.commit(Some(latch.listener()))?;
//! child.terminated(CallOrigin::Background);
//! assert!(latch.wait().is_terminal());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod controller;
mod error;
mod executor;
mod listener;
mod problem;
mod registry;
mod stats;
mod transaction;
mod types;

pub use config::{ControllerConfig, TxnConfig};
pub use controller::TransactionController;
pub use error::{ExecuteError, TxnError, TxnResult};
pub use executor::{Executor, Job, ThreadExecutor};
pub use listener::{CompletionLatch, Listener};
pub use problem::{is_committable, Problem, ProblemReport, Severity};
pub use registry::Transactions;
pub use stats::{StatsSnapshot, TransactionStats};
pub use transaction::{
    next_transition, Actions, ChildCounters, ChildHandle, Phase, Register, RequestFlags, Run,
    TaskChild, TaskFactory, Transaction, TransactionHandle, TransactionSnapshot, Transition,
};
pub use types::{CallOrigin, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
