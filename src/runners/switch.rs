// src/runners/switch.rs

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::dag::{TaskCategory, TaskInfo, TaskKind, TaskStatus, descriptor::split_names};
use crate::errors::{FlowError, Result};
use crate::runners::{RunnerContext, TaskRunner, begin, complete};
use crate::types::Context;

pub const EMPTY_SWITCHES_MSG: &str = "switches collection empty";

/// Evaluates every switch and vetoes the successors named only by switches
/// that did not match. A successor named by any matched switch runs. The
/// switch task itself always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchRunner;

impl TaskRunner for SwitchRunner {
    fn category(&self) -> TaskCategory {
        TaskCategory::Switch
    }

    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let TaskKind::Switch(spec) = &task.task.kind else {
            return Err(FlowError::illegal(format!("{} is not a switch task", task.name)));
        };
        let switches = spec.switches.clone();

        let input = cx.input_for(task)?;
        begin(cx, task, &input)?;
        if switches.is_empty() {
            return complete(cx, task, TaskStatus::Succeed, Some(EMPTY_SWITCHES_MSG.to_string()), None);
        }

        let scopes = cx.scopes(task, &input, &Context::new());
        let mut run = BTreeSet::new();
        let mut skip = BTreeSet::new();
        for switch in &switches {
            let names = split_names(&switch.next);
            if names.is_empty() {
                continue;
            }
            let matched = match &switch.condition {
                None => true,
                Some(condition) => cx.mapper.evaluate(&scopes, condition).unwrap_or_else(|err| {
                    warn!(task = %task.name, condition = %condition, error = %err, "switch condition failed to evaluate");
                    false
                }),
            };
            let target = if matched { &mut run } else { &mut skip };
            target.extend(names.into_iter().map(str::to_string));
        }

        skip.retain(|name| !run.contains(name));
        debug!(execution_id = %cx.execution_id, task = %task.name, ?run, ?skip, "switch evaluated");
        task.skip_next.extend(skip);
        complete(cx, task, TaskStatus::Succeed, None, None)
    }
}
