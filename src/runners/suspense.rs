// src/runners/suspense.rs

//! Suspense: park the task until its conditions hold.
//!
//! `run` evaluates right away: a matching interruption fails the task,
//! non-empty conditions that all match succeed it. Otherwise the task is
//! SUSPENDED, with a `task_wait_check` when the timeline asks for one.
//!
//! A wakeup (or the timeline wait firing) moves it back to RUNNING, merges
//! the wakeup data through the output mappings and evaluates again. With no
//! conditions the first wake succeeds; otherwise the task stays RUNNING until
//! a later wakeup makes the conditions hold.

use tracing::{debug, info};

use crate::dag::{
    NotifyInfo, PendingWait, SuspenseTask, TaskCategory, TaskInfo, TaskKind, TaskStatus,
};
use crate::errors::{FlowError, Result};
use crate::mapping::{all_match, any_match};
use crate::runners::{RunnerContext, TaskRunner, begin, complete, leave_wait};
use crate::types::Context;

pub const INTERRUPTED_MSG: &str = "interrupted";

#[derive(Debug, Clone, Copy, Default)]
pub struct SuspenseRunner;

fn spec(task: &TaskInfo) -> Result<SuspenseTask> {
    match &task.task.kind {
        TaskKind::Suspense(spec) => Ok(spec.clone()),
        _ => Err(FlowError::illegal(format!("{} is not a suspense task", task.name))),
    }
}

/// Returns whether the task reached a terminal status.
fn evaluate(
    cx: &mut RunnerContext<'_>,
    task: &mut TaskInfo,
    input: &Context,
    data: &Context,
    wake: bool,
) -> Result<bool> {
    let spec = spec(task)?;
    let scopes = cx.scopes(task, input, data);

    if any_match(cx.mapper, &scopes, &spec.interruptions)? {
        info!(execution_id = %cx.execution_id, task = %task.name, "suspense interrupted");
        complete(cx, task, TaskStatus::Failed, Some(INTERRUPTED_MSG.to_string()), Some(data))?;
        return Ok(true);
    }

    let satisfied = if spec.conditions.is_empty() {
        wake
    } else {
        all_match(cx.mapper, &scopes, &spec.conditions)?
    };
    if satisfied {
        complete(cx, task, TaskStatus::Succeed, None, Some(data))?;
        return Ok(true);
    }
    Ok(false)
}

impl TaskRunner for SuspenseRunner {
    fn category(&self) -> TaskCategory {
        TaskCategory::Suspense
    }

    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let input = cx.input_for(task)?;
        begin(cx, task, &input)?;
        if evaluate(cx, task, &input, &Context::new(), false)? {
            return Ok(());
        }

        task.transition(TaskStatus::Suspended)?;
        let due = task
            .task
            .timeline
            .as_ref()
            .and_then(|t| t.wait_due_ms(cx.now_ms));
        if let Some(due_ms) = due {
            task.pending_wait = Some(PendingWait::Delay);
            cx.register_wait(task, due_ms);
        }
        debug!(execution_id = %cx.execution_id, task = %task.name, due_ms = ?due, "task suspended");
        Ok(())
    }

    fn resume(
        &self,
        cx: &mut RunnerContext<'_>,
        task: &mut TaskInfo,
        notify: &NotifyInfo,
        data: Context,
    ) -> Result<()> {
        if !task.status.is_in_flight() {
            return Err(FlowError::illegal(format!(
                "suspense task {} cannot be woken in status {:?}",
                task.name, task.status
            )));
        }
        leave_wait(task)?;

        let input = cx.input_for(task)?;
        cx.apply_output(task, &input, &data)?;

        match notify.status {
            Some(status) if status.is_terminal() => {
                complete(cx, task, status, notify.msg.clone(), Some(&data))
            }
            _ => {
                if !evaluate(cx, task, &input, &data, true)? {
                    debug!(execution_id = %cx.execution_id, task = %task.name, "conditions not met, still waiting");
                }
                Ok(())
            }
        }
    }

    fn wake(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        self.resume(cx, task, &NotifyInfo::default(), Context::new())
    }
}
