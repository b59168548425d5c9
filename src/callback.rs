// src/callback.rs

//! Callback contract.
//!
//! After every traversal step the engine releases the instance lock and then
//! reports terminal task transitions and DAG-level signals to the registered
//! [`DagCallback`], in the order they happened.

use serde::Serialize;
use tracing::info;

use crate::dag::{DagEvent, DagInfo, TaskInfo};
use crate::types::Context;

#[derive(Debug, Clone, Serialize)]
pub struct CallbackEvent {
    pub execution_id: String,
    pub event: DagEvent,
    /// Snapshot of the instance after the step.
    pub dag_info: DagInfo,
    pub context: Context,
    /// Affected task, for `TASK_*` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskInfo>,
}

pub trait DagCallback: Send + Sync {
    fn on_event(&self, event: &CallbackEvent);
}

/// Default callback: one log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCallback;

impl DagCallback for LoggingCallback {
    fn on_event(&self, event: &CallbackEvent) {
        match &event.task {
            Some(task) => info!(
                execution_id = %event.execution_id,
                event = ?event.event,
                task = %task.name,
                status = ?task.status,
                msg = ?task.msg,
                "task event"
            ),
            None => info!(
                execution_id = %event.execution_id,
                event = ?event.event,
                status = ?event.dag_info.status,
                msg = ?event.dag_info.msg,
                "dag event"
            ),
        }
    }
}
