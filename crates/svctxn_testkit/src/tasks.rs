//! Recording child tasks.
//!
//! A [`RecordingTask`] appends every instruction it receives to a shared
//! [`EventLog`], so tests can check ordering across all children of a
//! transaction. Depending on its [`Behavior`] it either waits for the test
//! to report on its behalf or answers each instruction by itself.

use parking_lot::Mutex;
use std::sync::Arc;
use svctxn_core::{CallOrigin, ChildHandle, TaskChild, TransactionHandle, TxnResult};

/// An instruction a child received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `begin_validate`
    Validate,
    /// `begin_commit`
    Commit,
    /// `begin_rollback`
    Rollback,
}

/// One entry in an [`EventLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Task that received the instruction.
    pub task: usize,
    /// The instruction.
    pub instruction: Instruction,
    /// Origin passed with the instruction.
    pub origin: CallOrigin,
}

/// Shared, ordered record of instructions.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&self, task: usize, instruction: Instruction, origin: CallOrigin) {
        self.events.lock().push(Event {
            task,
            instruction,
            origin,
        });
    }

    /// Returns a copy of every event so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Instructions received by one task, in order.
    pub fn instructions_for(&self, task: usize) -> Vec<Instruction> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.task == task)
            .map(|e| e.instruction)
            .collect()
    }

    /// Number of times `instruction` was sent to any task.
    pub fn count(&self, instruction: Instruction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.instruction == instruction)
            .count()
    }

    /// Position of the first occurrence of `instruction`.
    pub fn first(&self, instruction: Instruction) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .position(|e| e.instruction == instruction)
    }

    /// Position of the last occurrence of `instruction`.
    pub fn last(&self, instruction: Instruction) -> Option<usize> {
        self.events
            .lock()
            .iter()
            .rposition(|e| e.instruction == instruction)
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// How a [`RecordingTask`] responds to instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Record only; the test reports for the task.
    #[default]
    Manual,
    /// Report `validation_finished` on validate and `terminated` on
    /// commit or rollback, from inside the callback.
    AutoReply,
}

/// A child task that records what it is told.
#[derive(Debug)]
pub struct RecordingTask {
    id: usize,
    log: EventLog,
    behavior: Behavior,
    handle: Mutex<Option<ChildHandle>>,
}

impl RecordingTask {
    /// Creates a detached task.
    pub fn new(id: usize, log: EventLog, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            log,
            behavior,
            handle: Mutex::new(None),
        })
    }

    /// Creates a task and adds it to `txn`.
    pub fn spawn(
        txn: &TransactionHandle,
        id: usize,
        log: &EventLog,
        behavior: Behavior,
    ) -> TxnResult<(Arc<Self>, ChildHandle)> {
        let task = Self::new(id, log.clone(), behavior);
        let handle = txn.add_child(Arc::clone(&task) as Arc<dyn TaskChild>, CallOrigin::User)?;
        task.attach(handle.clone());
        Ok((task, handle))
    }

    /// Gives the task its link back to the transaction.
    pub fn attach(&self, handle: ChildHandle) {
        *self.handle.lock() = Some(handle);
    }

    /// Task identifier used in the log.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Instructions this task received.
    pub fn instructions(&self) -> Vec<Instruction> {
        self.log.instructions_for(self.id)
    }

    fn receive(&self, instruction: Instruction, origin: CallOrigin) {
        self.log.record(self.id, instruction, origin);
        if self.behavior != Behavior::AutoReply {
            return;
        }
        // Clone out so the report runs without our lock held.
        let handle = self.handle.lock().clone();
        let Some(handle) = handle else {
            return;
        };
        match instruction {
            Instruction::Validate => handle.validation_finished(CallOrigin::Background),
            Instruction::Commit | Instruction::Rollback => {
                handle.terminated(CallOrigin::Background);
            }
        }
    }
}

impl TaskChild for RecordingTask {
    fn begin_validate(&self, origin: CallOrigin) {
        self.receive(Instruction::Validate, origin);
    }

    fn begin_commit(&self, origin: CallOrigin) {
        self.receive(Instruction::Commit, origin);
    }

    fn begin_rollback(&self, origin: CallOrigin) {
        self.receive(Instruction::Rollback, origin);
    }
}
