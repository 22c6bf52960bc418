//! Core type definitions for svctxn.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused within a
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Which kind of thread a call into the transaction came from.
///
/// The origin decides how completion listeners are delivered. Work
/// triggered from a caller's own thread hands listeners to the executor so
/// the caller's stack never re-enters the transaction; work triggered from
/// a background thread runs listeners inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallOrigin {
    /// A caller (user) thread.
    User,
    /// A worker or callback thread.
    Background,
}

impl CallOrigin {
    /// Returns true for [`CallOrigin::User`].
    #[must_use]
    pub const fn is_user(self) -> bool {
        matches!(self, CallOrigin::User)
    }
}

impl fmt::Display for CallOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOrigin::User => f.write_str("user"),
            CallOrigin::Background => f.write_str("background"),
        }
    }
}
