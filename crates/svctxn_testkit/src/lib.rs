//! # svctxn Testkit
//!
//! Test utilities for svctxn.
//!
//! This crate provides:
//! - Controller fixtures with hand-driven listener delivery
//! - Child tasks that record every instruction they receive
//! - Executors that queue, run inline, or refuse work
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use svctxn_testkit::prelude::*;
//!
//! #[test]
//! fn commit_two_children() {
//!     let fixture = TestController::new();
//!     let txn = fixture.begin();
//!     let children = fixture.spawn_tasks(&txn, 2, Behavior::AutoReply);
//!     txn.commit(None).unwrap();
//!     finish_all(&children);
//!     assert!(txn.is_committed());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod executors;
pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod tasks;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::executors::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::tasks::*;
}

pub use executors::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use tasks::*;
