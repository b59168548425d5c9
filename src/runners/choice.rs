// src/runners/choice.rs

use tracing::{debug, warn};

use crate::dag::{ChoiceTask, TaskCategory, TaskInfo, TaskKind, TaskStatus};
use crate::errors::{FlowError, Result};
use crate::runners::group::{
    all_groups_terminal, any_group, close, first_child_failure, group_contexts, open_group,
    refresh_groups,
};
use crate::runners::{RunnerContext, TaskRunner, begin};
use crate::types::Context;

pub const EMPTY_CHOICES_MSG: &str = "choices collection empty";
pub const NOT_CHOSEN_MSG: &str = "choice condition not matched";

/// Choice: every choice whose condition matches runs its tasks as one group,
/// with the Choice input as sub-context. Unselected groups are SKIPPED.
/// The output merges the sub-contexts of the selected groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChoiceRunner;

fn spec(task: &TaskInfo) -> Result<ChoiceTask> {
    match &task.task.kind {
        TaskKind::Choice(spec) => Ok(spec.clone()),
        _ => Err(FlowError::illegal(format!("{} is not a choice task", task.name))),
    }
}

impl TaskRunner for ChoiceRunner {
    fn category(&self) -> TaskCategory {
        TaskCategory::Choice
    }

    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let spec = spec(task)?;
        let input = cx.input_for(task)?;
        begin(cx, task, &input)?;

        if spec.choices.is_empty() {
            return close(
                cx,
                task,
                TaskStatus::Succeed,
                Some(EMPTY_CHOICES_MSG.to_string()),
                Context::new(),
            );
        }

        let scopes = cx.scopes(task, &input, &Context::new());
        for (index, choice) in spec.choices.iter().enumerate() {
            let selected = match &choice.condition {
                None => true,
                Some(condition) => cx.mapper.evaluate(&scopes, condition).unwrap_or_else(|err| {
                    warn!(task = %task.name, condition = %condition, error = %err, "choice condition failed to evaluate");
                    false
                }),
            };

            if selected {
                open_group(cx, task, index, &choice.tasks, Some(input.clone()));
                task.groups.insert(index, TaskStatus::Running);
            } else {
                open_group(cx, task, index, &choice.tasks, None);
                task.groups.insert(index, TaskStatus::Skipped);
                for child in task.children.values_mut() {
                    if child.group_index == Some(index) {
                        child.skip(NOT_CHOSEN_MSG)?;
                    }
                }
            }
            debug!(execution_id = %cx.execution_id, task = %task.name, index, selected, "choice evaluated");
        }
        Ok(())
    }

    fn settle(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<bool> {
        if task.status != TaskStatus::Running {
            return Ok(false);
        }
        let before = task.groups.clone();
        refresh_groups(task);
        if !all_groups_terminal(task) {
            return Ok(task.groups != before);
        }

        let (status, msg) = if any_group(task, TaskStatus::Failed) {
            (TaskStatus::Failed, first_child_failure(task))
        } else {
            (TaskStatus::Succeed, None)
        };
        let mut output = Context::new();
        for scope in group_contexts(cx, task, |s| s != TaskStatus::Skipped) {
            output.extend(scope);
        }
        close(cx, task, status, msg, output)?;
        Ok(true)
    }
}
