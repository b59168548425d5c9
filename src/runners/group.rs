// src/runners/group.rs

//! Helpers shared by the container runners (Choice, Foreach).
//!
//! A container owns numbered groups. Each group is one copy of the sub-task
//! list with its own sub-context, stored in the execution context under
//! `__<container>_<index>`. The container's `groups` map tracks each group:
//! NOT_STARTED (inactive), RUNNING (active), or the group's final status.

use serde_json::Value;

use crate::dag::task_info::{route_name, sub_context_key, task_instance_name};
use crate::dag::walk::group_status;
use crate::dag::{BaseTask, TaskInfo, TaskStatus};
use crate::errors::Result;
use crate::runners::{RunnerContext, complete};
use crate::types::Context;

/// Message of children and groups left over when their container finished.
pub const CONTAINER_DONE_MSG: &str = "container already finished";

/// Instantiate group `index` of `container`. `scope` seeds the group's
/// sub-context; `None` leaves the context untouched.
pub fn open_group(
    cx: &mut RunnerContext<'_>,
    container: &mut TaskInfo,
    index: usize,
    tasks: &[BaseTask],
    scope: Option<Context>,
) {
    if let Some(scope) = scope {
        let route = route_name(&container.name, index);
        cx.context.insert(sub_context_key(&route), Value::Object(scope));
    }
    for sub in tasks {
        let child = TaskInfo::child(&container.name, index, sub.clone());
        container.children.insert(child.name.clone(), child);
    }
    container.groups.insert(index, TaskStatus::NotStarted);
}

/// Record the final status of every active group whose children settled.
pub fn refresh_groups(container: &mut TaskInfo) {
    let active: Vec<usize> = container
        .groups
        .iter()
        .filter(|(_, status)| **status == TaskStatus::Running)
        .map(|(index, _)| *index)
        .collect();
    for index in active {
        let status = group_status(container.group_children(index));
        if status.is_terminal() {
            container.groups.insert(index, status);
        }
    }
}

pub fn all_groups_terminal(container: &TaskInfo) -> bool {
    container.groups.values().all(|s| s.is_terminal())
}

pub fn any_group(container: &TaskInfo, status: TaskStatus) -> bool {
    container.groups.values().any(|s| *s == status)
}

/// Instance of base task `base` inside group `index`.
pub fn member_name(container: &TaskInfo, index: usize, base: &str) -> String {
    task_instance_name(&route_name(&container.name, index), base)
}

/// Sub-contexts of the groups selected by `keep`, in index order.
pub fn group_contexts(
    cx: &RunnerContext<'_>,
    container: &TaskInfo,
    keep: impl Fn(TaskStatus) -> bool,
) -> Vec<Context> {
    container
        .groups
        .iter()
        .filter(|(_, status)| keep(**status))
        .map(|(index, _)| cx.scope(Some(&route_name(&container.name, *index))))
        .collect()
}

/// Message of the first failed child, for reporting.
pub fn first_child_failure(container: &TaskInfo) -> Option<String> {
    container
        .children
        .values()
        .find(|c| c.status == TaskStatus::Failed)
        .map(|c| {
            c.msg
                .clone()
                .unwrap_or_else(|| format!("sub task {} failed", c.name))
        })
}

/// Finish a container: skip children and groups that never started, merge
/// `output` through the container's output mappings and move it to `status`.
pub fn close(
    cx: &mut RunnerContext<'_>,
    container: &mut TaskInfo,
    status: TaskStatus,
    msg: Option<String>,
    output: Context,
) -> Result<()> {
    for child in container.children.values_mut() {
        if child.status == TaskStatus::NotStarted {
            child.skip(CONTAINER_DONE_MSG)?;
        }
    }
    for group in container.groups.values_mut() {
        if *group == TaskStatus::NotStarted {
            *group = TaskStatus::Skipped;
        }
    }

    if status == TaskStatus::Succeed {
        let input = cx.input_for(container)?;
        cx.apply_output(container, &input, &output)?;
    }
    complete(cx, container, status, msg, Some(&output))
}
