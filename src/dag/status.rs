// src/dag/status.rs

//! Task and DAG status lattices plus the callback event codes.

use serde::{Deserialize, Serialize};

/// Runtime status of a single task instance.
///
/// Legal moves:
/// - `NotStarted -> Running | Skipped`
/// - `Running -> Running | Suspended | Succeed | Failed | Skipped`
/// - `Suspended -> Running | Failed | Skipped`
/// - `Failed -> Running` (retry / redo)
///
/// Redo resets back to `NotStarted` go through [`crate::dag::TaskInfo::reset`]
/// and are not part of the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    NotStarted,
    Running,
    Suspended,
    Succeed,
    Failed,
    Skipped,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::NotStarted
    }
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn is_success_or_skip(self) -> bool {
        matches!(self, TaskStatus::Succeed | TaskStatus::Skipped)
    }

    /// `Running` or `Suspended`: the task owns an in-flight attempt or wait.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Suspended)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (NotStarted, Running) | (NotStarted, Skipped) => true,
            (Running, Running)
            | (Running, Suspended)
            | (Running, Succeed)
            | (Running, Failed)
            | (Running, Skipped) => true,
            (Suspended, Running) | (Suspended, Failed) | (Suspended, Skipped) => true,
            (Failed, Running) => true,
            _ => false,
        }
    }
}

/// Instance-level status of a DAG execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagStatus {
    NotStarted,
    Running,
    /// Declared key tasks succeeded; other branches may still be running.
    KeySucceed,
    Succeed,
    Failed,
}

impl Default for DagStatus {
    fn default() -> Self {
        DagStatus::NotStarted
    }
}

impl DagStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DagStatus::Succeed | DagStatus::Failed)
    }
}

/// Signal codes handed to the registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DagEvent {
    DagFailed,
    DagSucceed,
    DagKeySucceed,
    TaskFinish,
    TaskFailed,
    TaskSkipped,
}

impl DagEvent {
    /// Event emitted when a task reaches the given terminal status.
    pub fn for_task_status(status: TaskStatus) -> Option<DagEvent> {
        match status {
            TaskStatus::Succeed => Some(DagEvent::TaskFinish),
            TaskStatus::Failed => Some(DagEvent::TaskFailed),
            TaskStatus::Skipped => Some(DagEvent::TaskSkipped),
            _ => None,
        }
    }

    pub fn is_dag_terminal(self) -> bool {
        matches!(self, DagEvent::DagFailed | DagEvent::DagSucceed)
    }
}
