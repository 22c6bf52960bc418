//! Error types for svctxn core.

use crate::types::TransactionId;
use std::io;
use thiserror::Error;

/// Result type for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors surfaced to callers of the transaction entry points.
///
/// Listener panics and executor failures never show up here; they are
/// logged and counted where they happen.
#[derive(Debug, Error)]
pub enum TxnError {
    /// The request does not fit the transaction's current phase, or was
    /// already made.
    #[error("invalid transaction state: {message}")]
    InvalidState {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The transaction committed, or is committing.
    #[error("transaction was committed")]
    AlreadyCommitted,

    /// The outcome of the transaction is (or will be) a rollback.
    #[error("transaction was rolled back")]
    RolledBack,

    /// Waiting for the target transaction would close a wait cycle.
    #[error("deadlock: {waiter} waiting for {target} would close a wait cycle")]
    Deadlock {
        /// The transaction that asked to wait.
        waiter: TransactionId,
        /// The transaction it wanted to wait for.
        target: TransactionId,
    },
}

impl TxnError {
    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns true if this error reports a rolled back transaction.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, TxnError::RolledBack)
    }

    /// Returns true if this error reports an already committed transaction.
    #[must_use]
    pub fn is_already_committed(&self) -> bool {
        matches!(self, TxnError::AlreadyCommitted)
    }

    /// Returns true for any invalid state error.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, TxnError::InvalidState { .. })
    }
}

/// Errors raised by an [`Executor`](crate::Executor) when accepting work.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The executor refused the job.
    #[error("job rejected: {reason}")]
    Rejected {
        /// Why the job was refused.
        reason: String,
    },

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

impl ExecuteError {
    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}
