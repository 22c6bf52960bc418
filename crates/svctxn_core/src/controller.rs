//! Transaction controller.

use crate::config::{ControllerConfig, TxnConfig};
use crate::executor::{Executor, ThreadExecutor};
use crate::registry::Transactions;
use crate::stats::TransactionStats;
use crate::transaction::{Transaction, TransactionCore};
use crate::types::TransactionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Creates transactions and owns what they share.
///
/// The controller provides:
/// - Monotonic transaction IDs
/// - The registry of live transactions, which doubles as the wait
///   coordinator
/// - The executor used for asynchronous listener delivery
/// - Shared outcome statistics
pub struct TransactionController {
    config: ControllerConfig,
    executor: Arc<dyn Executor>,
    registry: Arc<Transactions>,
    stats: Arc<TransactionStats>,
    next_txid: AtomicU64,
}

impl TransactionController {
    /// Creates a controller that delivers listeners on spawned threads.
    pub fn new(config: ControllerConfig) -> Self {
        let executor = Arc::new(ThreadExecutor::new(config.thread_name.clone()));
        Self::with_executor(config, executor)
    }

    /// Creates a controller with a caller-supplied executor.
    pub fn with_executor(config: ControllerConfig, executor: Arc<dyn Executor>) -> Self {
        Self::with_parts(config, executor, Arc::new(Transactions::new()))
    }

    /// Creates a controller that shares a registry with other controllers.
    pub fn with_parts(
        config: ControllerConfig,
        executor: Arc<dyn Executor>,
        registry: Arc<Transactions>,
    ) -> Self {
        let next_txid = AtomicU64::new(config.first_id);
        Self {
            config,
            executor,
            registry,
            stats: Arc::new(TransactionStats::new()),
            next_txid,
        }
    }

    /// Creates a transaction with the default configuration.
    pub fn create(&self) -> Transaction {
        self.create_with(self.config.transaction.clone())
    }

    /// Creates a transaction with a specific configuration.
    pub fn create_with(&self, config: TxnConfig) -> Transaction {
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        Transaction::from_core(TransactionCore::new(
            id,
            config,
            Arc::clone(&self.executor),
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
        ))
    }

    /// Returns the number of live transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Returns the registry of live transactions.
    #[must_use]
    pub fn registry(&self) -> &Arc<Transactions> {
        &self.registry
    }

    /// Returns the shared statistics.
    #[must_use]
    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// Returns the controller configuration.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

impl Default for TransactionController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl std::fmt::Debug for TransactionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionController")
            .field("active_count", &self.active_count())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
