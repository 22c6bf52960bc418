//! Transaction state register and transition function.
//!
//! The register holds the persistent part of a transaction's state: its
//! phase, the sticky request flags and the child counters. Running the
//! register applies the transition table until nothing more can happen and
//! returns the side effects the caller must perform once it has released
//! the transaction lock. Nothing in this module has side effects.

use std::fmt;

/// Lifecycle phase of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Phase {
    /// Accepting new children; counters count children added.
    Active,
    /// Children are validating.
    Preparing,
    /// Validation finished; waiting for a commit or rollback decision.
    Prepared,
    /// Children are rolling back.
    Rollback,
    /// Children are committing.
    Committing,
    /// Terminal: everything was rolled back.
    RolledBack,
    /// Terminal: everything was committed.
    Committed,
}

impl Phase {
    /// Returns true for [`Phase::Committed`] and [`Phase::RolledBack`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Phase::Committed | Phase::RolledBack)
    }

    /// Returns true while prepare, commit or rollback may still be requested.
    #[must_use]
    pub const fn accepts_requests(self) -> bool {
        matches!(self, Phase::Active | Phase::Preparing | Phase::Prepared)
    }

    /// Position along the transition table. Phases only ever move to a
    /// higher rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Phase::Active => 0,
            Phase::Preparing => 1,
            Phase::Prepared => 2,
            Phase::Rollback | Phase::Committing => 3,
            Phase::RolledBack | Phase::Committed => 4,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Active => "active",
            Phase::Preparing => "preparing",
            Phase::Prepared => "prepared",
            Phase::Rollback => "rollback",
            Phase::Committing => "committing",
            Phase::RolledBack => "rolled-back",
            Phase::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Sticky request flags. Set once by a caller, never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RequestFlags {
    /// Rollback was requested.
    pub rollback: bool,
    /// Prepare was requested.
    pub prepare: bool,
    /// Commit was requested.
    pub commit: bool,
}

/// Side effects produced by one driver run.
///
/// Never stored; the caller performs them after releasing the lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actions {
    /// Tell every child to begin validating.
    pub send_validate: bool,
    /// Tell every child to begin committing.
    pub send_commit: bool,
    /// Tell every child to begin rolling back.
    pub send_rollback: bool,
    /// Invoke the validation listener.
    pub fire_validation_listener: bool,
    /// Invoke the terminate listener.
    pub fire_terminate_listener: bool,
    /// Deregister the transaction.
    pub clean_up: bool,
}

impl Actions {
    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Actions::default()
    }

    fn union(&mut self, other: Actions) {
        self.send_validate |= other.send_validate;
        self.send_commit |= other.send_commit;
        self.send_rollback |= other.send_rollback;
        self.fire_validation_listener |= other.fire_validation_listener;
        self.fire_terminate_listener |= other.fire_terminate_listener;
        self.clean_up |= other.clean_up;
    }
}

/// Outstanding work of the top-level children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ChildCounters {
    /// Children that have not finished executing.
    pub unfinished: u32,
    /// Children that have not finished validating.
    pub unvalidated: u32,
    /// Children that have not terminated.
    pub unterminated: u32,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Active -> Preparing.
    ActiveToPreparing,
    /// Active -> Rollback.
    ActiveToRollback,
    /// Preparing -> Prepared.
    PreparingToPrepared,
    /// Preparing -> Rollback.
    PreparingToRollback,
    /// Prepared -> Committing.
    PreparedToCommitting,
    /// Prepared -> Rollback.
    PreparedToRollback,
    /// Rollback -> RolledBack.
    RollbackToRolledBack,
    /// Committing -> Committed.
    CommittingToCommitted,
}

impl Transition {
    /// Phase the transition ends in.
    #[must_use]
    pub const fn target(self) -> Phase {
        match self {
            Transition::ActiveToPreparing => Phase::Preparing,
            Transition::PreparingToPrepared => Phase::Prepared,
            Transition::PreparedToCommitting => Phase::Committing,
            Transition::CommittingToCommitted => Phase::Committed,
            Transition::RollbackToRolledBack => Phase::RolledBack,
            Transition::ActiveToRollback
            | Transition::PreparingToRollback
            | Transition::PreparedToRollback => Phase::Rollback,
        }
    }

    /// Side effects the transition requests.
    #[must_use]
    pub fn actions(self) -> Actions {
        match self {
            Transition::ActiveToPreparing => Actions {
                send_validate: true,
                ..Actions::default()
            },
            Transition::ActiveToRollback
            | Transition::PreparingToRollback
            | Transition::PreparedToRollback => Actions {
                send_rollback: true,
                ..Actions::default()
            },
            Transition::PreparingToPrepared => Actions {
                fire_validation_listener: true,
                ..Actions::default()
            },
            Transition::PreparedToCommitting => Actions {
                send_commit: true,
                ..Actions::default()
            },
            Transition::RollbackToRolledBack | Transition::CommittingToCommitted => Actions {
                fire_terminate_listener: true,
                clean_up: true,
                ..Actions::default()
            },
        }
    }
}

/// Computes the next transition from the current state, if any.
///
/// `committable` is only consulted at [`Phase::Prepared`] with a pending
/// commit request.
pub fn next_transition(
    phase: Phase,
    requests: &RequestFlags,
    counters: &ChildCounters,
    committable: &dyn Fn() -> bool,
) -> Option<Transition> {
    match phase {
        Phase::Active if counters.unfinished == 0 => {
            if requests.rollback {
                Some(Transition::ActiveToRollback)
            } else if requests.prepare || requests.commit {
                Some(Transition::ActiveToPreparing)
            } else {
                None
            }
        }
        Phase::Active => None,
        Phase::Preparing => {
            if requests.rollback {
                Some(Transition::PreparingToRollback)
            } else if counters.unvalidated == 0 {
                Some(Transition::PreparingToPrepared)
            } else {
                None
            }
        }
        Phase::Prepared => {
            if requests.rollback {
                Some(Transition::PreparedToRollback)
            } else if requests.commit {
                if committable() {
                    Some(Transition::PreparedToCommitting)
                } else {
                    Some(Transition::PreparedToRollback)
                }
            } else {
                None
            }
        }
        Phase::Rollback if counters.unterminated == 0 => Some(Transition::RollbackToRolledBack),
        Phase::Committing if counters.unterminated == 0 => {
            Some(Transition::CommittingToCommitted)
        }
        Phase::Rollback | Phase::Committing | Phase::RolledBack | Phase::Committed => None,
    }
}

/// Result of one driver run.
#[derive(Debug, Default)]
pub struct Run {
    /// Accumulated side effects of every applied transition.
    pub actions: Actions,
    /// Transitions applied, in order.
    pub path: Vec<Transition>,
}

/// The persistent state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    /// Current phase.
    pub phase: Phase,
    /// Sticky request flags.
    pub requests: RequestFlags,
    /// Child counters.
    pub counters: ChildCounters,
}

impl Default for Register {
    fn default() -> Self {
        Self::new()
    }
}

impl Register {
    /// A fresh register: active, no requests, no children.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Active,
            requests: RequestFlags {
                rollback: false,
                prepare: false,
                commit: false,
            },
            counters: ChildCounters {
                unfinished: 0,
                unvalidated: 0,
                unterminated: 0,
            },
        }
    }

    /// Applies transitions until none is possible.
    pub fn run(&mut self, committable: &dyn Fn() -> bool) -> Run {
        let mut run = Run::default();
        while let Some(t) = next_transition(self.phase, &self.requests, &self.counters, committable)
        {
            self.phase = t.target();
            run.actions.union(t.actions());
            run.path.push(t);
        }
        run
    }
}
