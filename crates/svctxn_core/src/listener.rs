//! Completion listeners.
//!
//! A transaction holds at most one pending validation listener and one
//! pending terminate listener. Each is consumed the first time it fires.

use crate::transaction::{Phase, TransactionHandle};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked when a transaction finishes a phase.
pub struct Listener(Box<dyn FnOnce(&TransactionHandle) + Send + 'static>);

impl Listener {
    /// Wraps a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&TransactionHandle) + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// A listener that does nothing.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Returns a listener that runs `self` and then `next`.
    #[must_use]
    pub fn then(self, next: Listener) -> Self {
        Self::new(move |txn| {
            self.call(txn);
            next.call(txn);
        })
    }

    /// Invokes the listener.
    pub fn call(self, txn: &TransactionHandle) {
        (self.0)(txn)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Listener")
    }
}

impl<F> From<F> for Listener
where
    F: FnOnce(&TransactionHandle) + Send + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

/// Single-shot holder for a pending listener.
#[derive(Debug, Default)]
pub(crate) struct ListenerSlot(Option<Listener>);

impl ListenerSlot {
    /// Stores a listener. An already pending listener is kept and runs first.
    pub(crate) fn set(&mut self, listener: Listener) {
        self.0 = Some(match self.0.take() {
            Some(pending) => pending.then(listener),
            None => listener,
        });
    }

    pub(crate) fn take(&mut self) -> Option<Listener> {
        self.0.take()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.0.is_some()
    }
}

#[derive(Debug, Default)]
struct LatchState {
    phase: Option<Phase>,
}

/// Blocks a thread until a listener fires.
///
/// ```rust,ignore
/// let latch = CompletionLatch::new();
/// txn.commit(Some(latch.listener()))?;
/// let phase = latch.wait();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompletionLatch {
    inner: Arc<(Mutex<LatchState>, Condvar)>,
}

impl CompletionLatch {
    /// Creates an unreleased latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a listener that releases this latch with the phase the
    /// transaction is in when it fires.
    pub fn listener(&self) -> Listener {
        let inner = Arc::clone(&self.inner);
        Listener::new(move |txn| {
            let (state, cond) = &*inner;
            state.lock().phase = Some(txn.phase());
            cond.notify_all();
        })
    }

    /// Returns the observed phase if the latch was released.
    pub fn try_get(&self) -> Option<Phase> {
        self.inner.0.lock().phase
    }

    /// Blocks until released.
    pub fn wait(&self) -> Phase {
        let (state, cond) = &*self.inner;
        let mut state = state.lock();
        loop {
            if let Some(phase) = state.phase {
                return phase;
            }
            cond.wait(&mut state);
        }
    }

    /// Blocks until released or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Phase> {
        let (state, cond) = &*self.inner;
        let mut state = state.lock();
        if state.phase.is_none() {
            cond.wait_while_for(&mut state, |s| s.phase.is_none(), timeout);
        }
        state.phase
    }
}
