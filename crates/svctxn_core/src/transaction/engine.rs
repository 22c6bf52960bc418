//! Shared transaction state and the action executor.
//!
//! Every entry point follows the same shape: take the lock, mutate the
//! register or the counters, run the register to a fixed point, turn the
//! resulting actions into a [`Batch`], and release the lock before any of
//! the batch's side effects run.
//!
//! Batches are queued under the lock in the order the register produced
//! them and drained by one thread at a time with the lock released. A
//! caller that finds another thread draining waits until that drain ends,
//! so its own child notifications have gone out before it returns. A
//! report made from inside a `begin_*` callback on the draining thread is
//! queued and picked up by the same drain. Children therefore always see
//! their validate instruction before any commit or rollback instruction.
//!
//! Listeners are collected during the drain and delivered after the drain
//! role is given up, so a listener may issue further requests.

use crate::config::TxnConfig;
use crate::error::{TxnError, TxnResult};
use crate::executor::{Executor, Job};
use crate::listener::{Listener, ListenerSlot};
use crate::problem::{self, ProblemReport};
use crate::registry::Transactions;
use crate::stats::TransactionStats;
use crate::transaction::child::{ChildEntry, ChildHandle, ChildProgress, ChildReport, TaskChild};
use crate::transaction::handle::TransactionHandle;
use crate::transaction::state::{Actions, ChildCounters, Phase, Register, RequestFlags};
use crate::types::{CallOrigin, TransactionId};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// A caller request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    Prepare,
    Commit,
    Rollback,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Prepare => f.write_str("prepare"),
            Request::Commit => f.write_str("commit"),
            Request::Rollback => f.write_str("rollback"),
        }
    }
}

/// Side effects captured by one driver run, executed outside the lock.
struct Batch {
    actions: Actions,
    origin: CallOrigin,
    children: Vec<Arc<dyn TaskChild>>,
    validation_listener: Option<Listener>,
    terminate_listener: Option<Listener>,
    outcome: Option<Phase>,
}

#[derive(Default)]
struct State {
    register: Register,
    children: Vec<ChildEntry>,
    added: usize,
    validation_listener: ListenerSlot,
    terminate_listener: ListenerSlot,
    end: Option<Instant>,
    pending: VecDeque<Batch>,
    drainer: Option<ThreadId>,
}

/// Point-in-time view of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransactionSnapshot {
    /// Transaction ID.
    pub id: TransactionId,
    /// Current phase.
    pub phase: Phase,
    /// Requests made so far.
    pub requests: RequestFlags,
    /// Outstanding child work.
    pub counters: ChildCounters,
    /// Number of top-level children ever added.
    pub children: usize,
}

pub(crate) struct TransactionCore {
    id: TransactionId,
    config: TxnConfig,
    start: Instant,
    state: Mutex<State>,
    drained: Condvar,
    rollback_requested: AtomicBool,
    problems: ProblemReport,
    executor: Arc<dyn Executor>,
    registry: Arc<Transactions>,
    pub(crate) stats: Arc<TransactionStats>,
}

impl TransactionCore {
    pub(crate) fn new(
        id: TransactionId,
        config: TxnConfig,
        executor: Arc<dyn Executor>,
        registry: Arc<Transactions>,
        stats: Arc<TransactionStats>,
    ) -> Arc<Self> {
        registry.register(id);
        stats.record_created();
        debug!(
            txn = %id,
            label = config.label.as_deref().unwrap_or(""),
            max_severity = %config.max_severity,
            "created transaction"
        );
        Arc::new(Self {
            id,
            config,
            start: Instant::now(),
            state: Mutex::new(State::default()),
            drained: Condvar::new(),
            rollback_requested: AtomicBool::new(false),
            problems: ProblemReport::new(),
            executor,
            registry,
            stats,
        })
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn config(&self) -> &TxnConfig {
        &self.config
    }

    pub(crate) fn problems(&self) -> &ProblemReport {
        &self.problems
    }

    pub(crate) fn registry(&self) -> &Transactions {
        &self.registry
    }

    pub(crate) fn is_rollback_requested(&self) -> bool {
        self.rollback_requested.load(Ordering::Acquire)
    }

    pub(crate) fn phase(&self) -> Phase {
        self.state.lock().register.phase
    }

    pub(crate) fn snapshot(&self) -> TransactionSnapshot {
        let state = self.state.lock();
        TransactionSnapshot {
            id: self.id,
            phase: state.register.phase,
            requests: state.register.requests,
            counters: state.register.counters,
            children: state.added,
        }
    }

    /// Time since creation, or the total run time once terminal.
    pub(crate) fn duration(&self) -> Duration {
        let end = self.state.lock().end;
        end.unwrap_or_else(Instant::now)
            .saturating_duration_since(self.start)
    }

    pub(crate) fn can_commit(&self) -> bool {
        if !self.phase().accepts_requests() {
            return false;
        }
        self.committable()
    }

    fn committable(&self) -> bool {
        problem::is_committable(&self.problems, self.config.max_severity)
    }

    pub(crate) fn request(
        self: &Arc<Self>,
        request: Request,
        listener: Option<Listener>,
    ) -> TxnResult<()> {
        let mut state = self.state.lock();
        check_request(&state.register, request)?;

        let listener = listener.unwrap_or_else(Listener::noop);
        let st = &mut *state;
        if request != Request::Prepare && st.terminate_listener.is_pending() {
            debug!(txn = %self.id, %request, "chaining terminate listener");
        }
        match request {
            Request::Prepare => {
                st.register.requests.prepare = true;
                st.validation_listener.set(listener);
            }
            Request::Commit => {
                st.register.requests.commit = true;
                st.terminate_listener.set(listener);
            }
            Request::Rollback => {
                st.register.requests.rollback = true;
                self.rollback_requested.store(true, Ordering::Release);
                st.terminate_listener.set(listener);
            }
        }
        debug!(txn = %self.id, %request, phase = %st.register.phase, "request accepted");

        self.advance(state, CallOrigin::User);
        Ok(())
    }

    pub(crate) fn add_child(
        self: &Arc<Self>,
        task: Arc<dyn TaskChild>,
        origin: CallOrigin,
    ) -> TxnResult<ChildHandle> {
        let mut state = self.state.lock();
        if state.register.phase != Phase::Active {
            return Err(TxnError::invalid_state("transaction is not active"));
        }

        let st = &mut *state;
        let index = st.children.len();
        st.children.push(ChildEntry {
            task,
            progress: ChildProgress::default(),
        });
        st.added += 1;
        let counters = &mut st.register.counters;
        counters.unfinished += 1;
        counters.unvalidated += 1;
        counters.unterminated += 1;
        debug!(txn = %self.id, child = index, %origin, "child added");

        self.advance(state, origin);
        Ok(ChildHandle {
            core: Arc::clone(self),
            index,
        })
    }

    pub(crate) fn child_report(
        self: &Arc<Self>,
        index: usize,
        report: ChildReport,
        origin: CallOrigin,
    ) {
        let mut state = self.state.lock();
        if state.register.phase.is_terminal() {
            debug!(txn = %self.id, child = index, %report, "ignoring report after termination");
            return;
        }

        let st = &mut *state;
        let Some(entry) = st.children.get_mut(index) else {
            warn!(txn = %self.id, child = index, %report, "report from unknown child");
            return;
        };
        let progress = &mut entry.progress;
        let counters = &mut st.register.counters;

        let already = match report {
            ChildReport::ExecutionFinished => progress.executed,
            ChildReport::ValidationFinished => progress.validated,
            ChildReport::Terminated => progress.terminated,
        };
        if already {
            warn!(txn = %self.id, child = index, %report, "duplicate child report ignored");
            return;
        }

        if !progress.executed && report != ChildReport::ValidationFinished {
            progress.executed = true;
            counters.unfinished -= 1;
        }
        if !progress.validated && report != ChildReport::ExecutionFinished {
            progress.validated = true;
            counters.unvalidated -= 1;
        }
        if report == ChildReport::Terminated {
            progress.terminated = true;
            counters.unterminated -= 1;
        }
        debug!(txn = %self.id, child = index, %report, %origin, "child report");

        self.advance(state, origin);
    }

    /// Runs the register and dispatches whatever it produced.
    fn advance(self: &Arc<Self>, mut state: MutexGuard<'_, State>, origin: CallOrigin) {
        let run = state.register.run(&|| self.committable());
        if run.path.is_empty() {
            return;
        }

        let st = &mut *state;
        for t in &run.path {
            debug!(txn = %self.id, transition = ?t, to = %t.target(), "transition");
        }

        let actions = run.actions;
        let phase = st.register.phase;
        if phase.is_terminal() && st.end.is_none() {
            st.end = Some(Instant::now());
        }

        let sends = actions.send_validate || actions.send_commit || actions.send_rollback;
        let batch = Batch {
            actions,
            origin,
            children: if sends {
                st.children.iter().map(|c| Arc::clone(&c.task)).collect()
            } else {
                Vec::new()
            },
            validation_listener: if actions.fire_validation_listener {
                st.validation_listener.take()
            } else {
                None
            },
            terminate_listener: if actions.fire_terminate_listener {
                st.terminate_listener.take()
            } else {
                None
            },
            outcome: actions.clean_up.then_some(phase),
        };
        if phase.is_terminal() {
            // Children hold handles back to us; drop ours so the pair can be freed.
            st.children.clear();
        }

        state.pending.push_back(batch);

        let current = thread::current().id();
        if state.drainer == Some(current) {
            return;
        }
        while state.drainer.is_some() {
            self.drained.wait(&mut state);
        }
        if state.pending.is_empty() {
            return;
        }

        state.drainer = Some(current);
        let mut deliveries = Vec::new();
        let drained = panic::catch_unwind(AssertUnwindSafe(|| {
            while let Some(batch) = state.pending.pop_front() {
                MutexGuard::unlocked(&mut state, || self.dispatch(batch, origin, &mut deliveries));
            }
        }));
        state.drainer = None;
        self.drained.notify_all();
        drop(state);

        if drained.is_err() {
            error!(txn = %self.id, "action dispatch panicked");
        }
        for (listener, deferred) in deliveries {
            self.deliver(listener, deferred);
        }
    }

    /// Performs one batch in the fixed order: validate, commit, rollback,
    /// clean-up. Listeners are handed back for delivery once the drain
    /// ends.
    fn dispatch(
        self: &Arc<Self>,
        batch: Batch,
        drainer: CallOrigin,
        deliveries: &mut Vec<(Listener, bool)>,
    ) {
        let Batch {
            actions,
            origin,
            children,
            validation_listener,
            terminate_listener,
            outcome,
        } = batch;

        if actions.send_validate {
            self.notify_children(&children, "validate", |c| c.begin_validate(origin));
        }
        if actions.send_commit {
            self.notify_children(&children, "commit", |c| c.begin_commit(origin));
        }
        if actions.send_rollback {
            self.notify_children(&children, "rollback", |c| c.begin_rollback(origin));
        }
        if actions.clean_up {
            self.registry.unregister(self.id);
            match outcome {
                Some(Phase::Committed) => self.stats.record_committed(),
                Some(Phase::RolledBack) => self.stats.record_rolled_back(),
                _ => {}
            }
            debug!(
                txn = %self.id,
                outcome = ?outcome,
                elapsed_ms = self.duration().as_millis() as u64,
                "transaction terminated"
            );
        }

        let deferred = origin.is_user() || drainer.is_user();
        for listener in [validation_listener, terminate_listener].into_iter().flatten() {
            deliveries.push((listener, deferred));
        }
    }

    fn notify_children(
        &self,
        children: &[Arc<dyn TaskChild>],
        what: &'static str,
        notify: impl Fn(&dyn TaskChild),
    ) {
        for (index, child) in children.iter().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| notify(child.as_ref()))).is_err() {
                error!(txn = %self.id, child = index, what, "child notification panicked");
            }
        }
    }

    fn deliver(self: &Arc<Self>, listener: Listener, deferred: bool) {
        let handle = TransactionHandle::from_core(Arc::clone(self));
        if !deferred {
            invoke(listener, &handle);
            return;
        }

        let job: Job = Box::new(move || invoke(listener, &handle));
        match panic::catch_unwind(AssertUnwindSafe(|| self.executor.execute(job))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(txn = %self.id, error = %err, "failed to hand listener to executor");
                self.stats.record_executor_failure();
            }
            Err(_) => {
                error!(txn = %self.id, "executor panicked while accepting listener");
                self.stats.record_executor_failure();
            }
        }
    }
}

fn invoke(listener: Listener, txn: &TransactionHandle) {
    if panic::catch_unwind(AssertUnwindSafe(|| listener.call(txn))).is_err() {
        error!(txn = %txn.id(), "completion listener panicked");
        txn.core().stats.record_listener_failure();
    }
}

/// Validates a request against the register without mutating it.
fn check_request(register: &Register, request: Request) -> TxnResult<()> {
    let requests = &register.requests;
    let repeated = match request {
        Request::Prepare => requests.prepare,
        Request::Commit => requests.commit,
        Request::Rollback => requests.rollback,
    };
    if repeated {
        return Err(TxnError::invalid_state(format!("{request} already called")));
    }

    match register.phase {
        Phase::Rollback | Phase::RolledBack => Err(TxnError::RolledBack),
        Phase::Committing | Phase::Committed => Err(TxnError::AlreadyCommitted),
        Phase::Preparing | Phase::Prepared if request == Request::Prepare => {
            Err(TxnError::invalid_state("transaction was prepared"))
        }
        _ if request != Request::Rollback && requests.rollback => Err(TxnError::RolledBack),
        _ => Ok(()),
    }
}

impl fmt::Debug for TransactionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCore")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
