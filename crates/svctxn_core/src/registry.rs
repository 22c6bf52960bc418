//! Process-wide registry of live transactions and the wait coordinator.
//!
//! Every transaction registers on creation and unregisters when it reaches
//! a terminal phase. The registry also tracks which transaction is waiting
//! on which, so [`Transactions::wait_for`] can refuse a wait that would
//! close a cycle instead of blocking forever.

use crate::error::{TxnError, TxnResult};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
struct WaitGraph {
    active: HashSet<TransactionId>,
    /// waiter -> target. Kept acyclic.
    waits: HashMap<TransactionId, TransactionId>,
}

impl WaitGraph {
    fn reaches(&self, from: TransactionId, to: TransactionId) -> bool {
        let mut current = from;
        while let Some(&next) = self.waits.get(&current) {
            if next == to {
                return true;
            }
            current = next;
        }
        false
    }
}

/// Registry of live transactions.
#[derive(Debug, Default)]
pub struct Transactions {
    graph: Mutex<WaitGraph>,
    terminated: Condvar,
}

impl Transactions {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live transaction.
    pub fn register(&self, id: TransactionId) {
        self.graph.lock().active.insert(id);
    }

    /// Removes a transaction and wakes everyone waiting on it.
    pub fn unregister(&self, id: TransactionId) {
        let removed = self.graph.lock().active.remove(&id);
        if removed {
            debug!(txn = %id, "unregistered transaction");
            self.terminated.notify_all();
        }
    }

    /// Returns true if the transaction is registered.
    pub fn is_registered(&self, id: TransactionId) -> bool {
        self.graph.lock().active.contains(&id)
    }

    /// Returns the number of live transactions.
    pub fn active_count(&self) -> usize {
        self.graph.lock().active.len()
    }

    /// Returns the IDs of all live transactions, sorted.
    pub fn active_ids(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self.graph.lock().active.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Blocks until `target` is unregistered.
    ///
    /// Returns immediately if `target` is not live. Fails with
    /// [`TxnError::Deadlock`] if `target` is `waiter` itself or is already
    /// (transitively) waiting on `waiter`.
    pub fn wait_for(&self, waiter: TransactionId, target: TransactionId) -> TxnResult<()> {
        let mut graph = self.graph.lock();
        if !graph.active.contains(&target) {
            return Ok(());
        }
        if waiter == target || graph.reaches(target, waiter) {
            return Err(TxnError::Deadlock { waiter, target });
        }
        if graph.waits.contains_key(&waiter) {
            return Err(TxnError::invalid_state(format!(
                "{waiter} is already waiting for another transaction"
            )));
        }

        debug!(waiter = %waiter, target = %target, "waiting for transaction");
        graph.waits.insert(waiter, target);
        while graph.active.contains(&target) {
            self.terminated.wait(&mut graph);
        }
        graph.waits.remove(&waiter);
        Ok(())
    }

    /// Returns the transaction `waiter` is currently blocked on, if any.
    pub fn waiting_on(&self, waiter: TransactionId) -> Option<TransactionId> {
        self.graph.lock().waits.get(&waiter).copied()
    }
}
