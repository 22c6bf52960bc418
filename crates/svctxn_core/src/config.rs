//! Transaction and controller configuration.

use crate::problem::Severity;

/// Configuration for a single transaction.
#[derive(Debug, Clone)]
pub struct TxnConfig {
    /// Worst problem severity that still allows a commit.
    pub max_severity: Severity,

    /// Optional label carried into log output.
    pub label: Option<String>,
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            max_severity: Severity::Warning,
            label: None,
        }
    }
}

impl TxnConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the commit severity threshold.
    #[must_use]
    pub fn max_severity(mut self, severity: Severity) -> Self {
        self.max_severity = severity;
        self
    }

    /// Sets the log label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Configuration for a [`TransactionController`](crate::TransactionController).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Name prefix for threads started by the default executor.
    pub thread_name: String,

    /// Configuration applied by [`create`](crate::TransactionController::create).
    pub transaction: TxnConfig,

    /// First transaction ID handed out.
    pub first_id: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            thread_name: "svctxn-listener".to_string(),
            transaction: TxnConfig::default(),
            first_id: 1,
        }
    }
}

impl ControllerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executor thread name prefix.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the default transaction configuration.
    #[must_use]
    pub fn transaction(mut self, config: TxnConfig) -> Self {
        self.transaction = config;
        self
    }

    /// Sets the first transaction ID.
    #[must_use]
    pub fn first_id(mut self, id: u64) -> Self {
        self.first_id = id;
        self
    }
}
