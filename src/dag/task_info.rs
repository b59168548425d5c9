// src/dag/task_info.rs

//! Runtime task state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::descriptor::{BaseTask, TaskCategory};
use crate::dag::status::TaskStatus;
use crate::errors::{FlowError, Result};

/// Joins a group route and a base task name.
pub const TASK_NAME_CONNECTOR: &str = "-";
/// Joins a parent instance name and a group index.
pub const ROUTE_NAME_CONNECTOR: &str = "_";
/// Prefix of group sub-context keys inside the execution context.
pub const SUB_CONTEXT_PREFIX: &str = "__";

pub fn route_name(parent: &str, group_index: usize) -> String {
    format!("{parent}{ROUTE_NAME_CONNECTOR}{group_index}")
}

pub fn task_instance_name(route: &str, base_name: &str) -> String {
    format!("{route}{TASK_NAME_CONNECTOR}{base_name}")
}

pub fn sub_context_key(route: &str) -> String {
    format!("{SUB_CONTEXT_PREFIX}{route}")
}

/// Instance name of the container owning `route`.
pub fn parent_name(route: &str) -> &str {
    route
        .rsplit_once(ROUTE_NAME_CONNECTOR)
        .map(|(parent, _)| parent)
        .unwrap_or(route)
}

/// Depth-first lookup across a scope and everything nested in it.
pub fn find_in<'a>(tasks: &'a BTreeMap<String, TaskInfo>, name: &str) -> Option<&'a TaskInfo> {
    if let Some(task) = tasks.get(name) {
        return Some(task);
    }
    tasks.values().find_map(|t| t.find(name))
}

pub fn find_in_mut<'a>(tasks: &'a mut BTreeMap<String, TaskInfo>, name: &str) -> Option<&'a mut TaskInfo> {
    if tasks.contains_key(name) {
        return tasks.get_mut(name);
    }
    tasks.values_mut().find_map(|t| t.find_mut(name))
}

/// One invoke attempt of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    pub start_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// What a registered `task_wait_check` member resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingWait {
    /// Timeline wait before (or, for Suspense, during) the run.
    Delay,
    /// Retry backoff after a failed attempt.
    Retry,
}

/// Runtime wrapper around a [`BaseTask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Instance name, unique in the execution (`<route>-<base>` when nested).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_index: Option<usize>,
    pub task: BaseTask,
    #[serde(default)]
    pub status: TaskStatus,
    /// Latest invoke message (error detail, skip reason, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<InvokeAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_wait: Option<PendingWait>,
    /// Child instances of Choice/Foreach, keyed by instance name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, TaskInfo>,
    /// Status per group index of a container.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<usize, TaskStatus>,
    /// Successor base names this task vetoed (Switch).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub skip_next: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl TaskInfo {
    /// A root-level instance.
    pub fn root(task: BaseTask) -> Self {
        Self {
            name: task.name.clone(),
            route_name: None,
            group_index: None,
            task,
            status: TaskStatus::NotStarted,
            msg: None,
            attempts: Vec::new(),
            pending_wait: None,
            children: BTreeMap::new(),
            groups: BTreeMap::new(),
            skip_next: BTreeSet::new(),
            max_concurrency: None,
        }
    }

    /// A child instance inside group `group_index` of `parent`.
    pub fn child(parent: &str, group_index: usize, task: BaseTask) -> Self {
        let route = route_name(parent, group_index);
        let mut info = Self::root(task);
        info.name = task_instance_name(&route, &info.task.name);
        info.route_name = Some(route);
        info.group_index = Some(group_index);
        info
    }

    pub fn base_name(&self) -> &str {
        &self.task.name
    }

    pub fn category(&self) -> TaskCategory {
        self.task.category()
    }

    pub fn is_container(&self) -> bool {
        self.category().is_container()
    }

    /// Instance names of the successors, resolved within this task's route.
    pub fn next_instance_names(&self) -> Vec<String> {
        self.task
            .next_names()
            .into_iter()
            .map(|base| self.sibling_name(base))
            .collect()
    }

    /// Instance name of a sibling with the given base name.
    pub fn sibling_name(&self, base: &str) -> String {
        match &self.route_name {
            Some(route) => task_instance_name(route, base),
            None => base.to_string(),
        }
    }

    /// Move along the status lattice.
    pub fn transition(&mut self, to: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(FlowError::illegal(format!(
                "task {} cannot move from {:?} to {:?}",
                self.name, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }

    /// Number of attempts started so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn current_attempt(&self) -> Option<&InvokeAttempt> {
        self.attempts.last()
    }

    /// Open a new attempt and return its number.
    pub fn begin_attempt(&mut self, now_ms: i64, input: Option<Value>) -> u32 {
        let attempt = self.attempt_count() + 1;
        self.attempts.push(InvokeAttempt {
            attempt,
            start_ms: now_ms,
            input,
            ..Default::default()
        });
        attempt
    }

    /// Close the latest attempt if it is still open.
    pub fn end_attempt(
        &mut self,
        now_ms: i64,
        outcome: TaskStatus,
        msg: Option<String>,
        output: Option<Value>,
    ) {
        if msg.is_some() {
            self.msg = msg.clone();
        }
        if let Some(last) = self.attempts.last_mut() {
            if last.end_ms.is_none() {
                last.end_ms = Some(now_ms);
                last.outcome = Some(outcome);
                last.msg = msg;
                last.output = output;
            }
        }
    }

    /// Redo reset: back to `NotStarted` with a clean history and no children.
    pub fn reset(&mut self) {
        self.status = TaskStatus::NotStarted;
        self.msg = None;
        self.attempts.clear();
        self.pending_wait = None;
        self.children.clear();
        self.groups.clear();
        self.skip_next.clear();
        self.max_concurrency = None;
    }

    /// Mark as skipped with a reason; no-op for tasks already terminal.
    pub fn skip(&mut self, reason: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Ok(());
        }
        self.transition(TaskStatus::Skipped)?;
        self.msg = Some(reason.to_string());
        Ok(())
    }

    /// Depth-first lookup of an instance in this subtree (self included).
    pub fn find(&self, name: &str) -> Option<&TaskInfo> {
        if self.name == name {
            return Some(self);
        }
        self.children.values().find_map(|c| c.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut TaskInfo> {
        if self.name == name {
            return Some(self);
        }
        self.children.values_mut().find_map(|c| c.find_mut(name))
    }

    /// Children belonging to one group.
    pub fn group_children(&self, group_index: usize) -> impl Iterator<Item = &TaskInfo> {
        self.children
            .values()
            .filter(move |c| c.group_index == Some(group_index))
    }

    /// Visit this subtree depth-first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a TaskInfo)) {
        visit(self);
        for child in self.children.values() {
            child.walk(visit);
        }
    }
}
