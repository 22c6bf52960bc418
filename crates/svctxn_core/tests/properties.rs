//! Property tests over random interleavings of requests and child reports.

use proptest::prelude::*;
use svctxn_core::{
    next_transition, CallOrigin, ChildCounters, ChildHandle, Phase, Register, RequestFlags,
    Severity, TxnConfig,
};
use svctxn_testkit::prelude::*;

/// What a run of steps was allowed to do.
#[derive(Debug, Default)]
struct Accepted {
    prepare: bool,
    commit: bool,
    rollback: bool,
}

fn counters_bounded(counters: &ChildCounters, children: usize) -> bool {
    let n = children as u32;
    counters.unfinished <= n && counters.unvalidated <= n && counters.unterminated <= n
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn interleavings_keep_invariants((children, steps) in scenario_strategy(4)) {
        let fixture = TestController::new();
        let txn = fixture.begin_with(TxnConfig::new().max_severity(Severity::Warning));
        let handles: Vec<ChildHandle> = fixture
            .spawn_tasks(&txn, children, Behavior::Manual)
            .into_iter()
            .map(|(_, handle)| handle)
            .collect();
        let listeners = StepListeners::new();
        let mut accepted = Accepted::default();
        let mut rank = txn.phase().rank();

        for step in &steps {
            let before = txn.snapshot();
            let result = step.apply(&txn, &handles, &listeners);

            match (step, &result) {
                (Step::Prepare, Ok(())) => accepted.prepare = true,
                (Step::Commit, Ok(())) => accepted.commit = true,
                (Step::Rollback, Ok(())) => accepted.rollback = true,
                (_, Err(_)) => {
                    // A refused request changes nothing.
                    prop_assert!(step.is_request());
                    prop_assert_eq!(txn.snapshot(), before);
                }
                _ => {}
            }

            let snap = txn.snapshot();
            prop_assert!(counters_bounded(&snap.counters, children));
            prop_assert!(snap.phase.rank() >= rank, "phase moved backwards");
            rank = snap.phase.rank();

            fixture.settle();
            prop_assert!(listeners.prepare.fired() <= 1);
            prop_assert!(listeners.commit.fired() <= 1);
            prop_assert!(listeners.rollback.fired() <= 1);
        }

        // Let every child finish so any pending outcome can be reached.
        terminate_all_handles(&handles);
        fixture.settle();

        let phase = txn.phase();
        if accepted.commit || accepted.rollback {
            prop_assert!(phase.is_terminal());
            prop_assert_eq!(listeners.commit.fired(), usize::from(accepted.commit));
            prop_assert_eq!(listeners.rollback.fired(), usize::from(accepted.rollback));
        } else if accepted.prepare {
            prop_assert_eq!(phase, Phase::Prepared);
            prop_assert_eq!(listeners.prepare.fired(), 1);
        } else {
            prop_assert_eq!(phase, Phase::Active);
        }

        if phase == Phase::Committed {
            prop_assert!(!accepted.rollback);
        }
        if accepted.commit
            && !accepted.rollback
            && txn.problem_report().max_severity() <= Severity::Warning
        {
            prop_assert_eq!(phase, Phase::Committed);
        }
        prop_assert!(two_phase_order_holds(&fixture.log));
    }

    #[test]
    fn register_never_moves_backwards(
        rollback in any::<bool>(),
        prepare in any::<bool>(),
        commit in any::<bool>(),
        committable in any::<bool>(),
        unfinished in 0u32..2,
        unvalidated in 0u32..2,
        unterminated in 0u32..2,
    ) {
        let mut register = Register::new();
        register.requests = RequestFlags { rollback, prepare, commit };
        register.counters = ChildCounters { unfinished, unvalidated, unterminated };

        let run = register.run(&|| committable);

        let mut phase = Phase::Active;
        for t in &run.path {
            prop_assert!(t.target().rank() > phase.rank());
            phase = t.target();
        }
        prop_assert_eq!(phase, register.phase);
        prop_assert!(
            next_transition(register.phase, &register.requests, &register.counters, &|| committable)
                .is_none()
        );
        if register.phase == Phase::Committed {
            prop_assert!(commit && committable && !rollback);
        }
    }
}

fn terminate_all_handles(handles: &[ChildHandle]) {
    for handle in handles {
        handle.terminated(CallOrigin::Background);
    }
}
