//! End-to-end transaction scenarios.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use svctxn_core::{
    CallOrigin, CompletionLatch, ControllerConfig, ExecuteError, Executor, Job, Listener, Phase,
    Severity, TaskChild, TransactionController, TxnConfig, TxnError,
};
use svctxn_testkit::prelude::*;

#[test]
fn commit_without_children_cascades_to_committed() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let done = FireCounter::new();

    txn.commit(Some(done.listener())).unwrap();

    assert_eq!(txn.phase(), Phase::Committed);
    assert!(txn.is_terminated());
    assert_eq!(fixture.settle(), 1);
    assert_eq!(done.fired(), 1);
    assert_eq!(fixture.settle(), 0);
    assert_eq!(done.fired(), 1);
}

#[test]
fn prepare_waits_for_child_then_cascades() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 1, Behavior::Manual);
    let (task, child) = &children[0];
    let validated = FireCounter::new();

    txn.prepare(Some(validated.listener())).unwrap();
    assert_eq!(txn.phase(), Phase::Active);
    assert!(task.instructions().is_empty());

    child.execution_finished(CallOrigin::Background);
    assert_eq!(txn.phase(), Phase::Preparing);
    assert_eq!(task.instructions(), vec![Instruction::Validate]);

    child.validation_finished(CallOrigin::Background);
    assert_eq!(txn.phase(), Phase::Prepared);
    assert_eq!(validated.fired(), 1);
}

#[test]
fn rollback_after_commit_is_already_committed() {
    let fixture = TestController::new();
    let txn = fixture.begin();

    txn.commit(None).unwrap();
    let err = txn.rollback(None).unwrap_err();

    assert!(err.is_already_committed());
    assert_eq!(txn.phase(), Phase::Committed);
}

#[test]
fn rollback_waits_for_unterminated_child() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 1, Behavior::Manual);
    let (task, child) = &children[0];
    let done = FireCounter::new();

    child.execution_finished(CallOrigin::Background);
    txn.rollback(Some(done.listener())).unwrap();

    assert_eq!(txn.phase(), Phase::Rollback);
    assert_eq!(task.instructions(), vec![Instruction::Rollback]);
    assert_eq!(fixture.settle(), 0);
    assert_eq!(done.fired(), 0);

    child.terminated(CallOrigin::Background);
    assert_eq!(txn.phase(), Phase::RolledBack);
    assert_eq!(done.fired(), 1);
    assert_eq!(fixture.settle(), 0);
}

#[test]
fn auto_reply_children_commit_in_two_phases() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 3, Behavior::AutoReply);
    let latch = CompletionLatch::new();

    txn.commit(Some(latch.listener())).unwrap();
    finish_all(&children);

    assert_eq!(txn.phase(), Phase::Committed);
    // The last report came from a background thread.
    assert_eq!(latch.try_get(), Some(Phase::Committed));
    assert!(two_phase_order_holds(&fixture.log));
    for (task, _) in &children {
        assert_eq!(
            task.instructions(),
            vec![Instruction::Validate, Instruction::Commit]
        );
    }
}

#[test]
fn validate_reaches_every_child_before_commit() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 4, Behavior::AutoReply);

    txn.commit(None).unwrap();
    finish_all(&children);

    let events = fixture.log.events();
    let validates: Vec<_> = events
        .iter()
        .take_while(|e| e.instruction == Instruction::Validate)
        .map(|e| e.task)
        .collect();
    assert_eq!(validates, vec![0, 1, 2, 3]);
    assert!(events[4..]
        .iter()
        .all(|e| e.instruction == Instruction::Commit));
}

#[test]
fn severity_over_threshold_rolls_back_instead() {
    let fixture = TestController::new();
    let txn = fixture.begin_with(TxnConfig::new().max_severity(Severity::Warning));
    let children = fixture.spawn_tasks(&txn, 2, Behavior::AutoReply);
    let latch = CompletionLatch::new();

    txn.problem_report().report(Severity::Warning, "slow start");
    assert!(txn.can_commit());
    txn.problem_report().report(Severity::Error, "port in use");
    assert!(!txn.can_commit());

    txn.commit(Some(latch.listener())).unwrap();
    finish_all(&children);

    assert_eq!(latch.try_get(), Some(Phase::RolledBack));
    assert_eq!(fixture.log.count(Instruction::Commit), 0);
    assert_eq!(fixture.log.count(Instruction::Rollback), 2);
    assert_eq!(fixture.stats().rolled_back(), 1);
}

#[test]
fn higher_threshold_tolerates_errors() {
    let fixture = TestController::new();
    let txn = fixture.begin_with(TxnConfig::new().max_severity(Severity::Error));
    txn.problem_report().report(Severity::Error, "degraded");

    txn.commit(None).unwrap();

    assert!(txn.is_committed());
}

#[test]
fn rollback_during_preparing_sends_rollback() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 2, Behavior::Manual);
    let done = FireCounter::new();

    txn.prepare(None).unwrap();
    finish_all(&children);
    assert_eq!(txn.phase(), Phase::Preparing);

    txn.rollback(Some(done.listener())).unwrap();
    assert_eq!(txn.phase(), Phase::Rollback);
    assert!(txn.is_rollback_requested());
    assert!(two_phase_order_holds(&fixture.log));

    terminate_all(&children);
    assert!(txn.is_rolled_back());
    assert_eq!(done.fired(), 1);
}

#[test]
fn commit_and_rollback_listeners_both_fire_once() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 1, Behavior::Manual);
    let committed = FireCounter::new();
    let rolled_back = FireCounter::new();

    txn.commit(Some(committed.listener())).unwrap();
    txn.rollback(Some(rolled_back.listener())).unwrap();
    terminate_all(&children);

    assert!(txn.is_rolled_back());
    assert_eq!(committed.fired(), 1);
    assert_eq!(rolled_back.fired(), 1);
}

#[test]
fn request_errors_leave_state_unchanged() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let _children = fixture.spawn_tasks(&txn, 1, Behavior::Manual);

    txn.prepare(None).unwrap();
    let before = txn.snapshot();

    let err = txn.prepare(None).unwrap_err();
    assert!(matches!(err, TxnError::InvalidState { .. }));
    assert_eq!(txn.snapshot(), before);

    txn.rollback(None).unwrap();
    assert!(txn.commit(None).unwrap_err().is_rolled_back());
    assert!(txn.snapshot().requests.rollback);
    assert!(!txn.snapshot().requests.commit);
}

#[test]
fn task_factory_adds_children_from_other_threads() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let factory = txn.task_factory();
    let log = fixture.log.clone();

    let handle = std::thread::spawn(move || {
        let task = RecordingTask::new(9, log, Behavior::AutoReply);
        let child = factory
            .add_child(Arc::clone(&task) as Arc<dyn TaskChild>, CallOrigin::Background)
            .unwrap();
        task.attach(child.clone());
        child
    });
    let child = handle.join().unwrap();

    assert_eq!(txn.snapshot().children, 1);
    txn.commit(None).unwrap();
    child.execution_finished(CallOrigin::Background);
    assert!(txn.is_committed());
}

#[test]
fn late_reports_are_ignored() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 1, Behavior::Manual);

    txn.rollback(None).unwrap();
    terminate_all(&children);
    assert!(txn.is_rolled_back());

    terminate_all(&children);
    finish_all(&children);
    assert!(txn.is_rolled_back());
}

#[test]
fn child_panic_does_not_stop_others() {
    struct Exploding;

    impl TaskChild for Exploding {
        fn begin_validate(&self, _origin: CallOrigin) {
            panic!("validate exploded");
        }
        fn begin_commit(&self, _origin: CallOrigin) {}
        fn begin_rollback(&self, _origin: CallOrigin) {}
    }

    let fixture = TestController::new();
    let txn = fixture.begin();
    let bad = txn.add_child(Arc::new(Exploding), CallOrigin::User).unwrap();
    let good = fixture.spawn_tasks(&txn, 1, Behavior::Manual);

    txn.commit(None).unwrap();
    bad.execution_finished(CallOrigin::Background);
    finish_all(&good);

    assert_eq!(good[0].0.instructions(), vec![Instruction::Validate]);
    assert_eq!(txn.phase(), Phase::Preparing);
}

#[test]
fn inline_executor_delivers_on_caller() {
    let controller = TransactionController::with_executor(
        ControllerConfig::default(),
        Arc::new(InlineExecutor) as Arc<dyn Executor>,
    );
    let txn = controller.create();
    let done = FireCounter::new();

    txn.rollback(Some(done.listener())).unwrap();

    assert_eq!(done.fired(), 1);
}

#[test]
fn validation_listener_can_commit_inline() {
    let fixture = TestController::new();
    let txn = fixture.begin();
    let children = fixture.spawn_tasks(&txn, 1, Behavior::Manual);
    let (task, child) = &children[0];
    let seen = Arc::new(Mutex::new(None));

    let observed = Arc::clone(&seen);
    let observer = Arc::clone(task);
    txn.prepare(Some(Listener::new(move |t| {
        let committed = t.commit(None);
        *observed.lock() = Some((committed.is_ok(), observer.instructions()));
    })))
    .unwrap();

    child.execution_finished(CallOrigin::Background);
    child.validation_finished(CallOrigin::Background);

    // Background reports run the listener inline, on this thread.
    assert_eq!(fixture.executor.pending(), 0);
    assert_eq!(
        seen.lock().clone(),
        Some((true, vec![Instruction::Validate, Instruction::Commit]))
    );
    assert_eq!(txn.phase(), Phase::Committing);

    child.terminated(CallOrigin::Background);
    assert!(txn.is_committed());
}

#[test]
fn listener_on_inline_executor_can_commit() {
    let controller = TransactionController::with_executor(
        ControllerConfig::default(),
        Arc::new(InlineExecutor) as Arc<dyn Executor>,
    );
    let txn = controller.create();
    let log = EventLog::new();
    let (task, child) = RecordingTask::spawn(&txn, 0, &log, Behavior::Manual).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let observed = Arc::clone(&seen);
    txn.prepare(Some(Listener::new(move |t| {
        t.commit(None).unwrap();
        *observed.lock() = task.instructions();
    })))
    .unwrap();

    child.execution_finished(CallOrigin::User);
    child.validation_finished(CallOrigin::User);

    assert_eq!(
        *seen.lock(),
        vec![Instruction::Validate, Instruction::Commit]
    );
    child.terminated(CallOrigin::User);
    assert!(txn.is_committed());
}

#[test]
fn terminate_listener_can_start_another_transaction() {
    let fixture = TestController::new();
    let first = fixture.begin();
    let second = fixture.begin();
    let children = fixture.spawn_tasks(&second, 1, Behavior::Manual);
    let (task, child) = &children[0];
    child.execution_finished(CallOrigin::Background);

    let next = second.handle();
    first
        .rollback(Some(Listener::new(move |_| {
            next.rollback(None).unwrap();
        })))
        .unwrap();
    assert_eq!(fixture.settle(), 1);

    assert_eq!(task.instructions(), vec![Instruction::Rollback]);
    child.terminated(CallOrigin::Background);
    assert!(second.is_rolled_back());
}

#[test]
fn panicking_executor_does_not_wedge_transaction() {
    struct Panicking;

    impl Executor for Panicking {
        fn execute(&self, _job: Job) -> Result<(), ExecuteError> {
            panic!("executor exploded");
        }
    }

    let controller = TransactionController::with_executor(
        ControllerConfig::default(),
        Arc::new(Panicking) as Arc<dyn Executor>,
    );
    let txn = controller.create();
    let log = EventLog::new();
    let (task, child) = RecordingTask::spawn(&txn, 0, &log, Behavior::Manual).unwrap();

    txn.prepare(Some(Listener::noop())).unwrap();
    child.execution_finished(CallOrigin::User);
    child.validation_finished(CallOrigin::User);
    assert_eq!(txn.phase(), Phase::Prepared);
    assert_eq!(controller.stats().executor_failures(), 1);

    txn.commit(None).unwrap();
    assert_eq!(txn.phase(), Phase::Committing);
    assert_eq!(
        task.instructions(),
        vec![Instruction::Validate, Instruction::Commit]
    );

    child.terminated(CallOrigin::User);
    assert!(txn.is_committed());
    assert_eq!(controller.stats().executor_failures(), 2);
}

#[test]
fn rejecting_executor_loses_listener_but_not_outcome() {
    let executor = Arc::new(RejectingExecutor::new());
    let controller = TransactionController::with_executor(
        ControllerConfig::default(),
        Arc::clone(&executor) as Arc<dyn Executor>,
    );
    let txn = controller.create();
    let done = FireCounter::new();

    txn.commit(Some(done.listener())).unwrap();

    assert!(txn.is_committed());
    assert_eq!(done.fired(), 0);
    assert_eq!(executor.rejected(), 1);
    assert_eq!(controller.stats().executor_failures(), 1);
}

#[test]
fn wait_for_returns_when_target_terminates() {
    let controller = TransactionController::default();
    let waiter = controller.create();
    let target = controller.create();
    let target_handle = target.handle();
    let waiter_handle = waiter.handle();

    let blocked = std::thread::spawn(move || waiter_handle.wait_for(&target_handle));
    std::thread::sleep(Duration::from_millis(20));
    target.commit(None).unwrap();

    blocked.join().unwrap().unwrap();
}

#[test]
fn wait_for_detects_deadlock() {
    let controller = TransactionController::default();
    let a = controller.create();
    let b = controller.create();
    let (a_handle, b_handle) = (a.handle(), b.handle());

    let blocked = std::thread::spawn(move || a_handle.wait_for(&b_handle));
    while controller.registry().waiting_on(a.id()).is_none() {
        std::thread::yield_now();
    }

    let err = b.wait_for(&a.handle()).unwrap_err();
    assert!(matches!(err, TxnError::Deadlock { .. }));

    b.rollback(None).unwrap();
    blocked.join().unwrap().unwrap();
}

#[test]
fn stats_track_outcomes() {
    let fixture = TestController::new();
    fixture.begin().commit(None).unwrap();
    fixture.begin().rollback(None).unwrap();
    drop(fixture.begin());

    let stats = fixture.stats().snapshot();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.committed, 1);
    assert_eq!(stats.rolled_back, 2);
    assert_eq!(stats.in_flight(), 0);
    assert_eq!(fixture.active_count(), 0);
}
