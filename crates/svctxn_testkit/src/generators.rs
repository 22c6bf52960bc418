//! Property-based test generators using proptest.
//!
//! Generates interleavings of caller requests, child reports and problem
//! reports against a transaction with a fixed set of children.

use crate::fixtures::FireCounter;
use proptest::prelude::*;
use svctxn_core::{CallOrigin, ChildHandle, Severity, TransactionHandle, TxnResult};

/// One thing that can happen to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Caller requests prepare.
    Prepare,
    /// Caller requests commit.
    Commit,
    /// Caller requests rollback.
    Rollback,
    /// Child reports it finished executing.
    Finish(usize),
    /// Child reports it finished validating.
    Validate(usize),
    /// Child reports it terminated.
    Terminate(usize),
    /// A task records a problem.
    Problem(Severity),
}

impl Step {
    /// Returns true for caller requests.
    pub fn is_request(&self) -> bool {
        matches!(self, Step::Prepare | Step::Commit | Step::Rollback)
    }

    /// Applies the step.
    ///
    /// Requests attach a listener from `listeners`, so a test can check
    /// how often each one fired. Child indices wrap around `children`.
    pub fn apply(
        &self,
        txn: &TransactionHandle,
        children: &[ChildHandle],
        listeners: &StepListeners,
    ) -> TxnResult<()> {
        let child = |i: usize| &children[i % children.len()];
        match *self {
            Step::Prepare => txn.prepare(Some(listeners.prepare.listener())),
            Step::Commit => txn.commit(Some(listeners.commit.listener())),
            Step::Rollback => txn.rollback(Some(listeners.rollback.listener())),
            Step::Finish(i) if !children.is_empty() => {
                child(i).execution_finished(CallOrigin::Background);
                Ok(())
            }
            Step::Validate(i) if !children.is_empty() => {
                child(i).validation_finished(CallOrigin::Background);
                Ok(())
            }
            Step::Terminate(i) if !children.is_empty() => {
                child(i).terminated(CallOrigin::Background);
                Ok(())
            }
            Step::Problem(severity) => {
                txn.problem_report().report(severity, "generated problem");
                Ok(())
            }
            Step::Finish(_) | Step::Validate(_) | Step::Terminate(_) => Ok(()),
        }
    }
}

/// One fire counter per request kind.
#[derive(Debug, Clone, Default)]
pub struct StepListeners {
    /// Listener passed with prepare.
    pub prepare: FireCounter,
    /// Listener passed with commit.
    pub commit: FireCounter,
    /// Listener passed with rollback.
    pub rollback: FireCounter,
}

impl StepListeners {
    /// Creates counters at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Strategy for problem severities.
pub fn severity_strategy() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Info),
        Just(Severity::Warning),
        Just(Severity::Error),
        Just(Severity::Critical),
    ]
}

/// Strategy for a single step against `children` children.
pub fn step_strategy(children: usize) -> impl Strategy<Value = Step> {
    let max = children.max(1);
    prop_oneof![
        1 => Just(Step::Prepare),
        1 => Just(Step::Commit),
        1 => Just(Step::Rollback),
        3 => (0..max).prop_map(Step::Finish),
        3 => (0..max).prop_map(Step::Validate),
        3 => (0..max).prop_map(Step::Terminate),
        1 => severity_strategy().prop_map(Step::Problem),
    ]
}

/// Strategy for a sequence of steps.
pub fn step_sequence_strategy(
    children: usize,
    min_steps: usize,
    max_steps: usize,
) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step_strategy(children), min_steps..max_steps)
}

/// Strategy for a child count together with a step sequence.
pub fn scenario_strategy(max_children: usize) -> impl Strategy<Value = (usize, Vec<Step>)> {
    (0..=max_children).prop_flat_map(|children| {
        (Just(children), step_sequence_strategy(children, 1, 40))
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn child_steps_stay_in_range((children, steps) in scenario_strategy(4)) {
            for step in steps {
                match step {
                    Step::Finish(i) | Step::Validate(i) | Step::Terminate(i) => {
                        prop_assert!(i < children.max(1));
                    }
                    _ => {}
                }
            }
        }

        #[test]
        fn sequences_respect_length(steps in step_sequence_strategy(3, 2, 10)) {
            prop_assert!(steps.len() >= 2 && steps.len() < 10);
        }
    }
}
