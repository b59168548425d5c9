// src/runners/return_task.rs

use tracing::info;

use crate::dag::{TaskCategory, TaskInfo, TaskKind, TaskStatus};
use crate::errors::{FlowError, Result};
use crate::mapping::all_match;
use crate::runners::{RunnerContext, TaskRunner, begin, complete};
use crate::types::Context;

/// Message of a Return whose conditions held.
pub const RETURNED_MSG: &str = "returned";
/// Message of a Return whose conditions did not hold.
pub const NOT_RETURNED_MSG: &str = "return conditions not matched";

/// Ends its scope early when its conditions hold (empty conditions always
/// hold).
///
/// A fired Return succeeds with [`RETURNED_MSG`] and vetoes all of its
/// successors; the traversal core then skips the rest of the scope and, at
/// the root, ends the execution. A Return that does not fire also succeeds,
/// so its successors run normally.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnRunner;

/// Whether `task` is a Return that fired.
pub fn fired(task: &TaskInfo) -> bool {
    task.category() == TaskCategory::Return
        && task.status == TaskStatus::Succeed
        && task.msg.as_deref() == Some(RETURNED_MSG)
}

impl TaskRunner for ReturnRunner {
    fn category(&self) -> TaskCategory {
        TaskCategory::Return
    }

    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let TaskKind::Return(spec) = &task.task.kind else {
            return Err(FlowError::illegal(format!("{} is not a return task", task.name)));
        };
        let conditions = spec.conditions.clone();

        let input = cx.input_for(task)?;
        begin(cx, task, &input)?;
        let scopes = cx.scopes(task, &input, &Context::new());
        if !all_match(cx.mapper, &scopes, &conditions)? {
            return complete(cx, task, TaskStatus::Succeed, Some(NOT_RETURNED_MSG.to_string()), None);
        }

        cx.apply_output(task, &input, &input)?;
        let successors: Vec<String> = task.task.next_names().into_iter().map(str::to_string).collect();
        task.skip_next.extend(successors);
        info!(execution_id = %cx.execution_id, task = %task.name, "return fired");
        complete(cx, task, TaskStatus::Succeed, Some(RETURNED_MSG.to_string()), Some(&input))
    }
}
