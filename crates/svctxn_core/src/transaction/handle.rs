//! Public transaction handles.

use crate::config::TxnConfig;
use crate::error::TxnResult;
use crate::listener::Listener;
use crate::problem::ProblemReport;
use crate::transaction::child::{ChildHandle, TaskChild, TaskFactory};
use crate::transaction::engine::{Request, TransactionCore, TransactionSnapshot};
use crate::transaction::state::Phase;
use crate::types::{CallOrigin, TransactionId};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared reference to a transaction.
///
/// Handles are cheap to clone and can be passed between threads. Dropping
/// a handle has no effect on the transaction; only the owning
/// [`Transaction`] rolls back on drop.
#[derive(Clone)]
pub struct TransactionHandle {
    core: Arc<TransactionCore>,
}

impl TransactionHandle {
    pub(crate) fn from_core(core: Arc<TransactionCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Arc<TransactionCore> {
        &self.core
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.core.id()
    }

    /// Returns the configuration the transaction was created with.
    #[must_use]
    pub fn config(&self) -> &TxnConfig {
        self.core.config()
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// Returns true once the transaction committed or rolled back.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Returns true if the transaction committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.phase() == Phase::Committed
    }

    /// Returns true if the transaction rolled back.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.phase() == Phase::RolledBack
    }

    /// Lock-free poll for a pending rollback request.
    ///
    /// Cooperating tasks check this to stop early; nothing is interrupted.
    #[must_use]
    pub fn is_rollback_requested(&self) -> bool {
        self.core.is_rollback_requested()
    }

    /// Time elapsed since creation, frozen once the transaction terminates.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.core.duration()
    }

    /// Problems reported by the transaction's tasks.
    #[must_use]
    pub fn problem_report(&self) -> &ProblemReport {
        self.core.problems()
    }

    /// Returns a point-in-time view of phase, requests and counters.
    #[must_use]
    pub fn snapshot(&self) -> TransactionSnapshot {
        self.core.snapshot()
    }

    /// Returns true if a commit requested now would be allowed to proceed.
    ///
    /// False once the transaction is rolling back, committing or terminal;
    /// otherwise compares the problem report against the severity
    /// threshold.
    #[must_use]
    pub fn can_commit(&self) -> bool {
        self.core.can_commit()
    }

    /// Requests validation of every child.
    ///
    /// `listener` fires once all children validated. Fails if prepare was
    /// already requested or the transaction moved past the point where
    /// preparing makes sense.
    pub fn prepare(&self, listener: Option<Listener>) -> TxnResult<()> {
        self.core.request(Request::Prepare, listener)
    }

    /// Requests a commit, preparing first if needed.
    ///
    /// `listener` fires once the transaction terminates. If the problem
    /// report exceeds the threshold when validation finishes, the
    /// transaction rolls back instead and the listener observes
    /// [`Phase::RolledBack`].
    pub fn commit(&self, listener: Option<Listener>) -> TxnResult<()> {
        self.core.request(Request::Commit, listener)
    }

    /// Requests a rollback.
    ///
    /// `listener` fires once every child has terminated.
    pub fn rollback(&self, listener: Option<Listener>) -> TxnResult<()> {
        self.core.request(Request::Rollback, listener)
    }

    /// Adds a top-level child. Fails unless the transaction is active.
    pub fn add_child(
        &self,
        child: Arc<dyn TaskChild>,
        origin: CallOrigin,
    ) -> TxnResult<ChildHandle> {
        self.core.add_child(child, origin)
    }

    /// Returns a factory that can only add children.
    #[must_use]
    pub fn task_factory(&self) -> TaskFactory {
        TaskFactory {
            core: Arc::clone(&self.core),
        }
    }

    /// Blocks until `other` terminates.
    ///
    /// Fails with [`TxnError::Deadlock`](crate::TxnError::Deadlock) if
    /// `other` is, directly or indirectly, waiting for this transaction.
    pub fn wait_for(&self, other: &TransactionHandle) -> TxnResult<()> {
        self.core.registry().wait_for(self.id(), other.id())
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        use crate::executor::ThreadExecutor;
        use crate::registry::Transactions;
        use crate::stats::TransactionStats;

        Self::from_core(TransactionCore::new(
            TransactionId::new(0),
            TxnConfig::default(),
            Arc::new(ThreadExecutor::default()),
            Arc::new(Transactions::new()),
            Arc::new(TransactionStats::new()),
        ))
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Owning handle to a transaction.
///
/// Dropping a `Transaction` that has not terminated issues a best-effort
/// rollback. Use [`Transaction::handle`] to share the transaction without
/// giving away ownership.
pub struct Transaction {
    handle: TransactionHandle,
    closed: bool,
}

impl Transaction {
    pub(crate) fn from_core(core: Arc<TransactionCore>) -> Self {
        Self {
            handle: TransactionHandle::from_core(core),
            closed: false,
        }
    }

    /// Returns a shared handle.
    #[must_use]
    pub fn handle(&self) -> TransactionHandle {
        self.handle.clone()
    }

    /// Closes the transaction, rolling back if it has not terminated.
    pub fn close(mut self) {
        self.closed = true;
        if !self.handle.is_terminated() {
            debug!(txn = %self.handle.id(), phase = %self.handle.phase(), "closing, rolling back");
            self.destroy();
        }
    }

    fn destroy(&self) {
        if let Err(err) = self.handle.rollback(None) {
            debug!(txn = %self.handle.id(), error = %err, "rollback on close refused");
        }
    }
}

impl Deref for Transaction {
    type Target = TransactionHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.closed || self.handle.is_terminated() {
            return;
        }
        warn!(
            txn = %self.handle.id(),
            phase = %self.handle.phase(),
            "transaction abandoned, rolling back"
        );
        self.destroy();
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.handle.id())
            .field("phase", &self.handle.phase())
            .finish()
    }
}
