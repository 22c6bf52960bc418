//! Top-level child tasks.

use crate::error::TxnResult;
use crate::transaction::engine::TransactionCore;
use crate::types::{CallOrigin, TransactionId};
use std::fmt;
use std::sync::Arc;

/// A unit of work registered directly under a transaction.
///
/// The transaction tells its children when to validate, commit and roll
/// back. Children answer through the [`ChildHandle`] they were given when
/// they were added. Implementations must not block in these methods; they
/// may report back synchronously from inside them.
pub trait TaskChild: Send + Sync {
    /// Begin validating.
    fn begin_validate(&self, origin: CallOrigin);

    /// Begin committing.
    fn begin_commit(&self, origin: CallOrigin);

    /// Begin rolling back.
    fn begin_rollback(&self, origin: CallOrigin);
}

/// What a child has reported so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ChildProgress {
    pub(crate) executed: bool,
    pub(crate) validated: bool,
    pub(crate) terminated: bool,
}

/// Report sent from a child back to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildReport {
    ExecutionFinished,
    ValidationFinished,
    Terminated,
}

impl fmt::Display for ChildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildReport::ExecutionFinished => f.write_str("execution-finished"),
            ChildReport::ValidationFinished => f.write_str("validation-finished"),
            ChildReport::Terminated => f.write_str("terminated"),
        }
    }
}

pub(crate) struct ChildEntry {
    pub(crate) task: Arc<dyn TaskChild>,
    pub(crate) progress: ChildProgress,
}

/// A child's link back to its transaction.
///
/// Reports are idempotent: repeating one, or reporting `terminated` before
/// the earlier phases, never counts a phase twice.
#[derive(Clone)]
pub struct ChildHandle {
    pub(crate) core: Arc<TransactionCore>,
    pub(crate) index: usize,
}

impl ChildHandle {
    /// Position of the child in registration order.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// ID of the owning transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.core.id()
    }

    /// Lock-free poll for a pending rollback request.
    #[must_use]
    pub fn is_rollback_requested(&self) -> bool {
        self.core.is_rollback_requested()
    }

    /// The child finished executing.
    pub fn execution_finished(&self, origin: CallOrigin) {
        self.core
            .child_report(self.index, ChildReport::ExecutionFinished, origin);
    }

    /// The child finished validating.
    pub fn validation_finished(&self, origin: CallOrigin) {
        self.core
            .child_report(self.index, ChildReport::ValidationFinished, origin);
    }

    /// The child terminated (committed or rolled back). Implies the
    /// earlier phases if they were never reported.
    pub fn terminated(&self, origin: CallOrigin) {
        self.core
            .child_report(self.index, ChildReport::Terminated, origin);
    }
}

impl fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildHandle")
            .field("transaction", &self.core.id())
            .field("index", &self.index)
            .finish()
    }
}

/// Registers new top-level children with a transaction.
///
/// A factory can be handed to worker threads without giving them the
/// power to prepare, commit or roll back.
#[derive(Clone)]
pub struct TaskFactory {
    pub(crate) core: Arc<TransactionCore>,
}

impl TaskFactory {
    /// Adds a child. Fails unless the transaction is still active.
    pub fn add_child(
        &self,
        child: Arc<dyn TaskChild>,
        origin: CallOrigin,
    ) -> TxnResult<ChildHandle> {
        self.core.add_child(child, origin)
    }

    /// ID of the owning transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.core.id()
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("transaction", &self.core.id())
            .finish()
    }
}
