//! Two-phase transactions over concurrently running child tasks.
//!
//! A transaction moves through these phases:
//!
//! ```text
//! Active -> Preparing -> Prepared -> Committing -> Committed
//!    \          \           \
//!     +----------+-----------+--> Rollback -> RolledBack
//! ```
//!
//! - **Atomicity**: every child commits or every child rolls back
//! - **Two-phase discipline**: no child sees a commit or rollback before
//!   every child has been told to validate, whenever validation started
//! - **Exactly-once notification**: each completion listener fires once

mod child;
mod engine;
mod handle;
mod state;

pub use child::{ChildHandle, TaskChild, TaskFactory};
pub use engine::TransactionSnapshot;
pub(crate) use engine::TransactionCore;
pub use handle::{Transaction, TransactionHandle};
pub use state::{
    next_transition, Actions, ChildCounters, Phase, Register, RequestFlags, Run, Transition,
};
