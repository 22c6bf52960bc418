//! Test fixtures and controller helpers.
//!
//! Provides a controller wired to a [`ManualExecutor`] so that deferred
//! listener delivery happens exactly when a test asks for it.

use crate::executors::ManualExecutor;
use crate::tasks::{Behavior, EventLog, RecordingTask};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use svctxn_core::{
    CallOrigin, ChildHandle, ControllerConfig, Executor, Listener, Transaction,
    TransactionController, TransactionHandle, TxnConfig,
};

/// A controller whose listener deliveries are run by hand.
pub struct TestController {
    /// The controller instance.
    pub controller: TransactionController,
    /// Executor receiving deferred listeners.
    pub executor: Arc<ManualExecutor>,
    /// Log shared by every task spawned through this fixture.
    pub log: EventLog,
}

impl TestController {
    /// Creates a fixture with the default controller configuration.
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    /// Creates a fixture with a specific controller configuration.
    pub fn with_config(config: ControllerConfig) -> Self {
        let executor = Arc::new(ManualExecutor::new());
        let controller = TransactionController::with_executor(
            config,
            Arc::clone(&executor) as Arc<dyn Executor>,
        );
        Self {
            controller,
            executor,
            log: EventLog::new(),
        }
    }

    /// Starts a transaction with the default transaction configuration.
    pub fn begin(&self) -> Transaction {
        self.controller.create()
    }

    /// Starts a transaction with a specific configuration.
    pub fn begin_with(&self, config: TxnConfig) -> Transaction {
        self.controller.create_with(config)
    }

    /// Adds `count` recording tasks numbered from zero.
    ///
    /// # Panics
    ///
    /// Panics if the transaction refuses a child.
    pub fn spawn_tasks(
        &self,
        txn: &TransactionHandle,
        count: usize,
        behavior: Behavior,
    ) -> Vec<(Arc<RecordingTask>, ChildHandle)> {
        (0..count)
            .map(|id| {
                RecordingTask::spawn(txn, id, &self.log, behavior)
                    .expect("transaction refused a child")
            })
            .collect()
    }

    /// Runs every deferred listener. Returns how many ran.
    pub fn settle(&self) -> usize {
        self.executor.run_all()
    }
}

impl Default for TestController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestController {
    type Target = TransactionController;

    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

/// Counts how many times its listeners fire.
#[derive(Debug, Clone, Default)]
pub struct FireCounter {
    count: Arc<AtomicUsize>,
}

impl FireCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a listener that increments the counter.
    pub fn listener(&self) -> Listener {
        let count = Arc::clone(&self.count);
        Listener::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Number of times a listener fired.
    pub fn fired(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Reports `execution_finished` for every child.
pub fn finish_all(children: &[(Arc<RecordingTask>, ChildHandle)]) {
    for (_, handle) in children {
        handle.execution_finished(CallOrigin::Background);
    }
}

/// Reports `validation_finished` for every child.
pub fn validate_all(children: &[(Arc<RecordingTask>, ChildHandle)]) {
    for (_, handle) in children {
        handle.validation_finished(CallOrigin::Background);
    }
}

/// Reports `terminated` for every child.
pub fn terminate_all(children: &[(Arc<RecordingTask>, ChildHandle)]) {
    for (_, handle) in children {
        handle.terminated(CallOrigin::Background);
    }
}
