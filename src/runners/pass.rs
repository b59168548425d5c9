// src/runners/pass.rs

use tracing::debug;

use crate::dag::{TaskCategory, TaskInfo, TaskStatus};
use crate::errors::Result;
use crate::runners::{RunnerContext, TaskRunner, begin, complete};

/// Applies its mappings and succeeds. `$.output` mirrors the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassRunner;

impl TaskRunner for PassRunner {
    fn category(&self) -> TaskCategory {
        TaskCategory::Pass
    }

    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let input = cx.input_for(task)?;
        begin(cx, task, &input)?;
        cx.apply_output(task, &input, &input)?;
        debug!(execution_id = %cx.execution_id, task = %task.name, "pass task done");
        complete(cx, task, TaskStatus::Succeed, None, Some(&input))
    }
}
