// src/dag/notify.rs

//! Transient event payloads.

use serde::{Deserialize, Serialize};

use crate::dag::descriptor::RetryConfig;
use crate::dag::status::TaskStatus;
use crate::dag::task_info::TaskInfo;
use crate::types::Context;

/// Addresses a task (or tasks) of an execution and describes the requested
/// transition. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyInfo {
    /// Instance name addressed by `finish` / `wakeup`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// Instance names addressed by `redo`; empty means "every failed task".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_names: Vec<String>,
    /// Requested status. When absent the runner decides from the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Attempt the notification answers; older attempts are discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Overrides the task's retry settings for this decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Context::is_empty")]
    pub ext: Context,
}

impl NotifyInfo {
    pub fn for_task(task_name: impl Into<String>) -> Self {
        Self {
            task_name: Some(task_name.into()),
            ..Default::default()
        }
    }

    pub fn for_tasks<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task_names: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// Input to the retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub task_name: String,
    pub status: TaskStatus,
    /// Attempts started so far (invoke history length, at least 1).
    pub attempts: u32,
    pub config: RetryConfig,
}

impl RetryContext {
    pub fn from_task(task: &TaskInfo, override_config: Option<&RetryConfig>) -> Self {
        Self {
            task_name: task.name.clone(),
            status: task.status,
            attempts: task.attempt_count().max(1),
            config: override_config
                .or(task.task.retry.as_ref())
                .cloned()
                .unwrap_or_default(),
        }
    }
}
