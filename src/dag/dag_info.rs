// src/dag/dag_info.rs

//! `DagInfo`: the aggregate root persisted per execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dag::descriptor::Dag;
use crate::dag::status::{DagStatus, TaskStatus};
use crate::dag::task_info::{TaskInfo, find_in, find_in_mut};
use crate::errors::{FlowError, Result};

/// Per-submit settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DagSettings {
    /// Replace an existing execution with the same id instead of rejecting.
    #[serde(default)]
    pub ignore_exist: bool,
    /// Overrides the configured maximum nesting depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    /// Overrides the descriptor's DAG timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagInfo {
    pub execution_id: String,
    pub dag: Dag,
    #[serde(default)]
    pub status: DagStatus,
    pub tasks: BTreeMap<String, TaskInfo>,
    #[serde(default)]
    pub settings: DagSettings,
    /// Failure detail (`timeout`, or the failing task's message).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_task: Option<String>,
    /// A root-level Return fired; the instance ends as soon as it is computed.
    #[serde(default)]
    pub returned: bool,
    #[serde(default)]
    pub key_succeed_notified: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl DagInfo {
    pub fn new(execution_id: impl Into<String>, dag: Dag, settings: DagSettings, now_ms: i64) -> Self {
        let tasks = dag
            .tasks
            .iter()
            .cloned()
            .map(|task| (task.name.clone(), TaskInfo::root(task)))
            .collect();
        Self {
            execution_id: execution_id.into(),
            dag,
            status: DagStatus::NotStarted,
            tasks,
            settings,
            msg: None,
            failed_task: None,
            returned: false,
            key_succeed_notified: false,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn find_task(&self, name: &str) -> Option<&TaskInfo> {
        find_in(&self.tasks, name)
    }

    pub fn find_task_mut(&mut self, name: &str) -> Option<&mut TaskInfo> {
        find_in_mut(&mut self.tasks, name)
    }

    /// Like [`DagInfo::find_task`] but as an error when missing.
    pub fn task(&self, name: &str) -> Result<&TaskInfo> {
        self.find_task(name).ok_or_else(|| FlowError::TaskNotFound {
            execution_id: self.execution_id.clone(),
            task: name.to_string(),
        })
    }

    pub fn task_mut(&mut self, name: &str) -> Result<&mut TaskInfo> {
        let execution_id = self.execution_id.clone();
        find_in_mut(&mut self.tasks, name).ok_or_else(|| FlowError::TaskNotFound {
            execution_id,
            task: name.to_string(),
        })
    }

    /// Every instance in the execution, depth-first.
    pub fn all_tasks(&self) -> Vec<&TaskInfo> {
        let mut out = Vec::new();
        for task in self.tasks.values() {
            task.walk(&mut |t| out.push(t));
        }
        out
    }

    /// Status of an instance, if it exists.
    pub fn task_status(&self, name: &str) -> Option<TaskStatus> {
        self.find_task(name).map(|t| t.status)
    }

    pub fn ensure_not_terminal(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(FlowError::illegal(format!(
                "execution {} already completed with {:?}",
                self.execution_id, self.status
            )));
        }
        Ok(())
    }
}
