// src/runners/function.rs

//! Function tasks: remote work through the dispatcher.
//!
//! `run` opens an attempt and emits a [`Effect::Dispatch`]; the call itself
//! happens outside the instance lock and its result comes back through
//! `finish`. A failed attempt consults the retry policy: a zero interval
//! re-dispatches in the same step, a positive one parks the task (still
//! RUNNING) behind a `task_wait_check`.

use tracing::{info, warn};

use crate::checker::TimeCheckMember;
use crate::clock::due_after;
use crate::dag::{
    FunctionTask, NotifyInfo, PendingWait, RetryConfig, RetryContext, TaskCategory, TaskInfo,
    TaskKind, TaskStatus,
};
use crate::dispatch::DispatchInfo;
use crate::engine::{Effect, TIMEOUT_MSG};
use crate::errors::{FlowError, Result};
use crate::mapping::{all_match, any_match};
use crate::runners::{RunnerContext, TaskRunner, begin, complete};
use crate::types::Context;

/// Prefix of resource names resolved through the DAG's `resources` table.
pub const RESOURCE_PREFIX: &str = "resource://";

#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionRunner;

fn spec(task: &TaskInfo) -> Result<FunctionTask> {
    match &task.task.kind {
        TaskKind::Function(spec) => Ok(spec.clone()),
        _ => Err(FlowError::illegal(format!("{} is not a function task", task.name))),
    }
}

/// `resource://name` → the DAG's declared resource; anything else as is.
pub fn resolve_resource(
    resource_name: &str,
    resources: &std::collections::BTreeMap<String, String>,
) -> Result<String> {
    match resource_name.strip_prefix(RESOURCE_PREFIX) {
        Some(key) => resources
            .get(key)
            .cloned()
            .ok_or_else(|| FlowError::Dispatch(format!("unknown resource '{key}'"))),
        None => Ok(resource_name.to_string()),
    }
}

impl FunctionRunner {
    fn decide(
        cx: &RunnerContext<'_>,
        task: &TaskInfo,
        spec: &FunctionTask,
        input: &Context,
        output: &Context,
    ) -> Result<TaskStatus> {
        let scopes = cx.scopes(task, input, output);
        if any_match(cx.mapper, &scopes, &spec.fail_conditions)? {
            return Ok(TaskStatus::Failed);
        }
        if all_match(cx.mapper, &scopes, &spec.success_conditions)? {
            Ok(TaskStatus::Succeed)
        } else {
            Ok(TaskStatus::Failed)
        }
    }

    fn fail_attempt(
        &self,
        cx: &mut RunnerContext<'_>,
        task: &mut TaskInfo,
        msg: String,
        retry_override: Option<&RetryConfig>,
        output: Option<&Context>,
    ) -> Result<()> {
        let recorded = output.and_then(|o| cx.io_value(o));
        task.end_attempt(cx.now_ms, TaskStatus::Failed, Some(msg.clone()), recorded);
        if task.task.timeline.as_ref().is_some_and(|t| t.timeout_in_seconds.is_some()) {
            cx.emit(Effect::RemoveTimeCheck(TimeCheckMember::task_timeout(
                cx.execution_id,
                task.category(),
                &task.name,
            )));
        }

        let mut retry = RetryContext::from_task(task, retry_override);
        retry.status = TaskStatus::Failed;
        if !cx.retry.need_retry(&retry) {
            return complete(cx, task, TaskStatus::Failed, Some(msg), output);
        }

        let seconds = cx.retry.retry_interval_seconds(&retry);
        info!(
            execution_id = %cx.execution_id,
            task = %task.name,
            attempt = retry.attempts,
            interval_seconds = seconds,
            "attempt failed, retrying"
        );
        if seconds == 0 {
            return self.run(cx, task);
        }
        task.pending_wait = Some(PendingWait::Retry);
        let due_ms = due_after(cx.now_ms, seconds);
        cx.register_wait(task, due_ms);
        Ok(())
    }
}

impl TaskRunner for FunctionRunner {
    fn category(&self) -> TaskCategory {
        TaskCategory::Function
    }

    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let spec = spec(task)?;
        let input = cx.input_for(task)?;
        let resource = resolve_resource(&spec.resource_name, cx.resources)?;

        let attempt = begin(cx, task, &input)?;
        cx.register_timeout(task);
        cx.emit(Effect::Dispatch(DispatchInfo {
            execution_id: cx.execution_id.to_string(),
            task_name: task.name.clone(),
            category: TaskCategory::Function,
            resource,
            pattern: spec.pattern,
            input,
            attempt,
        }));
        Ok(())
    }

    fn finish(
        &self,
        cx: &mut RunnerContext<'_>,
        task: &mut TaskInfo,
        notify: &NotifyInfo,
        output: Context,
    ) -> Result<()> {
        if task.status != TaskStatus::Running || task.pending_wait.is_some() {
            return Err(FlowError::illegal(format!(
                "function task {} is not waiting for a result (status {:?})",
                task.name, task.status
            )));
        }
        if let Some(attempt) = notify.attempt {
            if attempt != task.attempt_count() {
                warn!(
                    execution_id = %cx.execution_id,
                    task = %task.name,
                    attempt,
                    current = task.attempt_count(),
                    "stale finish discarded"
                );
                return Ok(());
            }
        }

        let spec = spec(task)?;
        let input = cx.input_for(task)?;
        let status = match notify.status {
            Some(status) => status,
            None => Self::decide(cx, task, &spec, &input, &output)?,
        };

        match status {
            TaskStatus::Succeed => {
                cx.apply_output(task, &input, &output)?;
                complete(cx, task, TaskStatus::Succeed, notify.msg.clone(), Some(&output))
            }
            TaskStatus::Failed => {
                let msg = notify.msg.clone().unwrap_or_else(|| "function task failed".to_string());
                self.fail_attempt(cx, task, msg, notify.retry.as_ref(), Some(&output))
            }
            TaskStatus::Skipped => complete(cx, task, TaskStatus::Skipped, notify.msg.clone(), Some(&output)),
            other => Err(FlowError::illegal(format!(
                "finish cannot move function task {} to {other:?}",
                task.name
            ))),
        }
    }

    fn timeout(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        if task.status == TaskStatus::Suspended {
            crate::runners::leave_wait(task)?;
        }
        self.fail_attempt(cx, task, TIMEOUT_MSG.to_string(), None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn resource_references_resolve_through_the_table() {
        let mut resources = BTreeMap::new();
        resources.insert("echo".to_string(), "local://echo".to_string());
        assert_eq!(resolve_resource("resource://echo", &resources).unwrap(), "local://echo");
        assert_eq!(resolve_resource("http://x/y", &resources).unwrap(), "http://x/y");
        assert!(resolve_resource("resource://missing", &resources).is_err());
    }
}
