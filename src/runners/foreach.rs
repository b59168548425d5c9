// src/runners/foreach.rs

//! Foreach: one group per collection item.
//!
//! Each group's sub-context starts as the Foreach input plus the item under
//! `iteration_mapping.item`. `synchronization.max_concurrency` bounds the
//! number of active groups; when one settles the next inactive group (lowest
//! index first) is activated. The completion policy decides when the Foreach
//! itself is done:
//!
//! - long board: every group settled; FAILED if any group failed
//! - short board: any group succeeded; FAILED once all settled without one
//! - key resource: the key sub-tasks succeeded (or were skipped) in every
//!   group; FAILED as soon as one of them fails
//!
//! The output is `{"sub_context": [group contexts in index order]}`.

use serde_json::Value;
use tracing::{debug, info};

use crate::dag::{CompletionPolicy, ForeachTask, TaskCategory, TaskInfo, TaskKind, TaskStatus};
use crate::errors::{FlowError, Result};
use crate::runners::group::{
    all_groups_terminal, any_group, close, first_child_failure, group_contexts, member_name,
    open_group, refresh_groups,
};
use crate::runners::{RunnerContext, TaskRunner, begin};
use crate::types::Context;

pub const EMPTY_LOOP_MSG: &str = "loop collection or subTasks empty";
/// Output key holding the group contexts.
pub const SUB_CONTEXT_KEY: &str = "sub_context";

#[derive(Debug, Clone, Copy, Default)]
pub struct ForeachRunner;

fn spec(task: &TaskInfo) -> Result<ForeachTask> {
    match &task.task.kind {
        TaskKind::Foreach(spec) => Ok(spec.clone()),
        _ => Err(FlowError::illegal(format!("{} is not a foreach task", task.name))),
    }
}

fn output_of(contexts: Vec<Context>) -> Context {
    let mut output = Context::new();
    output.insert(
        SUB_CONTEXT_KEY.to_string(),
        Value::Array(contexts.into_iter().map(Value::Object).collect()),
    );
    output
}

/// Activate inactive groups up to the concurrency bound.
fn activate(task: &mut TaskInfo) {
    let limit = task.max_concurrency.unwrap_or(usize::MAX);
    let mut active = task
        .groups
        .values()
        .filter(|s| **s == TaskStatus::Running)
        .count();
    for status in task.groups.values_mut() {
        if active >= limit {
            break;
        }
        if *status == TaskStatus::NotStarted {
            *status = TaskStatus::Running;
            active += 1;
        }
    }
}

/// `Some(status)` once the completion policy is satisfied.
fn verdict(policy: &CompletionPolicy, task: &TaskInfo) -> Option<TaskStatus> {
    let settled = all_groups_terminal(task);
    let any_failed = any_group(task, TaskStatus::Failed);
    match policy {
        CompletionPolicy::LongBoard => settled.then(|| {
            if any_failed {
                TaskStatus::Failed
            } else {
                TaskStatus::Succeed
            }
        }),
        CompletionPolicy::ShortBoard => {
            if any_group(task, TaskStatus::Succeed) {
                Some(TaskStatus::Succeed)
            } else if settled {
                Some(TaskStatus::Failed)
            } else {
                None
            }
        }
        CompletionPolicy::KeyResource { key_tasks } => {
            let keys: Vec<Option<TaskStatus>> = task
                .groups
                .keys()
                .flat_map(|index| {
                    key_tasks
                        .iter()
                        .map(move |key| member_name(task, *index, key))
                })
                .map(|name| task.children.get(&name).map(|c| c.status))
                .collect();
            if keys.iter().any(|s| *s == Some(TaskStatus::Failed)) {
                Some(TaskStatus::Failed)
            } else if keys.iter().all(|s| s.is_some_and(TaskStatus::is_success_or_skip)) {
                Some(TaskStatus::Succeed)
            } else if settled {
                Some(if any_failed {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Succeed
                })
            } else {
                None
            }
        }
    }
}

impl TaskRunner for ForeachRunner {
    fn category(&self) -> TaskCategory {
        TaskCategory::Foreach
    }

    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let spec = spec(task)?;
        let input = cx.input_for(task)?;
        begin(cx, task, &input)?;

        let scopes = cx.scopes(task, &input, &Context::new());
        let items = match cx.mapper.resolve(&scopes, &spec.iteration_mapping.collection)? {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(FlowError::Mapping(format!(
                    "foreach collection {} is not an array: {other}",
                    spec.iteration_mapping.collection
                )));
            }
        };

        if items.is_empty() || spec.tasks.is_empty() {
            return close(
                cx,
                task,
                TaskStatus::Succeed,
                Some(EMPTY_LOOP_MSG.to_string()),
                output_of(Vec::new()),
            );
        }

        info!(
            execution_id = %cx.execution_id,
            task = %task.name,
            groups = items.len(),
            "foreach fan-out"
        );
        for (index, item) in items.into_iter().enumerate() {
            let mut scope = input.clone();
            scope.insert(spec.iteration_mapping.item.clone(), item);
            open_group(cx, task, index, &spec.tasks, Some(scope));
        }
        task.max_concurrency = spec.synchronization.map(|s| s.max_concurrency.max(1));
        activate(task);
        Ok(())
    }

    fn settle(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<bool> {
        if task.status != TaskStatus::Running {
            return Ok(false);
        }
        let spec = spec(task)?;
        let before = task.groups.clone();
        refresh_groups(task);

        match verdict(&spec.completion, task) {
            Some(status) => {
                debug!(execution_id = %cx.execution_id, task = %task.name, ?status, "foreach settled");
                let msg = (status == TaskStatus::Failed)
                    .then(|| first_child_failure(task))
                    .flatten();
                let output = output_of(group_contexts(cx, task, |_| true));
                close(cx, task, status, msg, output)?;
                Ok(true)
            }
            None => {
                activate(task);
                Ok(task.groups != before)
            }
        }
    }
}
