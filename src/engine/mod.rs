// src/engine/mod.rs

//! Traversal engine.
//!
//! - [`core`] is the pure, synchronous state machine: one [`FlowEvent`] in,
//!   an updated `DagInfo`/context plus a [`CoreStep`] out.
//! - [`traversal`] is the IO shell around it: instance lock, load, apply,
//!   persist, then the step's time check writes.
//! - [`operations`] is the public facade (`submit`, `finish`, `wakeup`,
//!   `redo`, `run`). Once the lock is released it dispatches Function
//!   attempts, fires callbacks and resolves `run` waiters.
//! - [`time_check`] feeds fired checker members back in as events.

pub mod core;
pub mod operations;
pub mod result;
pub mod time_check;
pub mod traversal;

pub use self::core::TraversalCore;
pub use operations::{FlowOperations, FlowOperationsBuilder, RunResult};
pub use traversal::{DagTraversal, StepOutcome};

use crate::checker::TimeCheckMember;
use crate::dag::{DagEvent, NotifyInfo, TaskInfo};
use crate::dispatch::DispatchInfo;
use crate::types::Context;

/// Message of tasks skipped because every incoming edge was skipped.
pub const NORMAL_SKIP_MSG: &str = "skip due to dependent tasks return or degrade";
/// Message of tasks and executions ended by a time check.
pub const TIMEOUT_MSG: &str = "timeout";

/// Events a traversal step reacts to.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A fresh instance was created; merge `data` and start the roots.
    Submit { data: Context },
    /// A Function attempt finished.
    Finish { notify: NotifyInfo, data: Context },
    /// External wake of a Suspense (or delayed) task.
    Wakeup { notify: NotifyInfo, data: Context },
    /// Reset tasks and run them again.
    Redo { notify: NotifyInfo, data: Context },
    TaskTimeout { task: String },
    /// A timeline wait or retry backoff elapsed.
    TaskWait { task: String },
    DagTimeout,
}

impl FlowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowEvent::Submit { .. } => "submit",
            FlowEvent::Finish { .. } => "finish",
            FlowEvent::Wakeup { .. } => "wakeup",
            FlowEvent::Redo { .. } => "redo",
            FlowEvent::TaskTimeout { .. } => "task_timeout",
            FlowEvent::TaskWait { .. } => "task_wait",
            FlowEvent::DagTimeout => "dag_timeout",
        }
    }

    /// Timer events arrive after the fact and are dropped quietly when the
    /// execution already ended.
    pub fn is_timer(&self) -> bool {
        matches!(
            self,
            FlowEvent::TaskTimeout { .. } | FlowEvent::TaskWait { .. } | FlowEvent::DagTimeout
        )
    }
}

/// Side effect requested by the core. Time checks are written under the
/// execution lock; dispatches run after it is released.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Dispatch(DispatchInfo),
    AddTimeCheck { member: TimeCheckMember, due_ms: i64 },
    RemoveTimeCheck(TimeCheckMember),
}

/// Callback signal produced by a step.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event: DagEvent,
    pub task: Option<TaskInfo>,
}

/// Everything a step asks the shell to do.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    pub effects: Vec<Effect>,
    pub notifications: Vec<Notification>,
}
