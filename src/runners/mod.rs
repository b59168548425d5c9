// src/runners/mod.rs

//! Per-category task runners.
//!
//! A runner owns the category specific part of a task's life: starting it,
//! reacting to `finish` / wakeups / timeouts, and, for containers, deciding
//! when the container itself is done. Runners never touch sibling tasks or
//! the join; that is the traversal core's job.
//!
//! Runners are stateless and shared. Everything a call needs (the execution
//! context, the mapping capability, the retry policy, the clock reading and
//! the effect sink) travels in [`RunnerContext`].

pub mod choice;
pub mod foreach;
pub mod function;
pub mod group;
pub mod pass;
pub mod return_task;
pub mod suspense;
pub mod switch;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;

use crate::checker::TimeCheckMember;
use crate::clock::due_after;
use crate::dag::task_info::{SUB_CONTEXT_PREFIX, sub_context_key};
use crate::dag::{NotifyInfo, TaskCategory, TaskInfo, TaskStatus};
use crate::engine::{Effect, TIMEOUT_MSG};
use crate::errors::{FlowError, Result};
use crate::mapping::{self, Mapper};
use crate::retry::RetryPolicy;
use crate::types::Context;

pub use choice::ChoiceRunner;
pub use foreach::ForeachRunner;
pub use function::FunctionRunner;
pub use pass::PassRunner;
pub use return_task::ReturnRunner;
pub use suspense::SuspenseRunner;
pub use switch::SwitchRunner;

/// Borrowed view of one traversal step handed to runners.
pub struct RunnerContext<'a> {
    pub execution_id: &'a str,
    /// Whole execution context; group sub-contexts live under `__<route>`.
    pub context: &'a mut Context,
    pub resources: &'a BTreeMap<String, String>,
    pub mapper: &'a dyn Mapper,
    pub retry: &'a dyn RetryPolicy,
    pub record_invoke_io: bool,
    pub now_ms: i64,
    pub effects: &'a mut Vec<Effect>,
}

impl RunnerContext<'_> {
    /// Context visible to tasks of `route` (the root scope when `None`).
    pub fn scope(&self, route: Option<&str>) -> Context {
        match route {
            None => self
                .context
                .iter()
                .filter(|(key, _)| !key.starts_with(SUB_CONTEXT_PREFIX))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            Some(route) => match self.context.get(&sub_context_key(route)) {
                Some(Value::Object(map)) => map.clone(),
                _ => Context::new(),
            },
        }
    }

    /// Write back the context of `route`.
    pub fn store_scope(&mut self, route: Option<&str>, scope: Context) {
        match route {
            None => {
                self.context
                    .retain(|key, _| key.starts_with(SUB_CONTEXT_PREFIX));
                self.context.extend(scope);
            }
            Some(route) => {
                self.context
                    .insert(sub_context_key(route), Value::Object(scope));
            }
        }
    }

    /// Apply the task's input mappings to its scope and return the input.
    /// The scope itself is left untouched.
    pub fn input_for(&self, task: &TaskInfo) -> Result<Context> {
        let mut scope = self.scope(task.route_name.as_deref());
        let mut input = Context::new();
        let mut output = Context::new();
        self.mapper
            .mapping(&mut scope, &mut input, &mut output, &task.task.input_mappings)?;
        Ok(input)
    }

    /// Apply the task's output mappings into its scope.
    pub fn apply_output(&mut self, task: &TaskInfo, input: &Context, output: &Context) -> Result<()> {
        if task.task.output_mappings.is_empty() {
            return Ok(());
        }
        let route = task.route_name.as_deref();
        let mut scope = self.scope(route);
        let mut input = input.clone();
        let mut output = output.clone();
        let result = self
            .mapper
            .mapping(&mut scope, &mut input, &mut output, &task.task.output_mappings);
        self.store_scope(route, scope);
        result
    }

    /// `{context, input, output}` value for condition evaluation.
    pub fn scopes(&self, task: &TaskInfo, input: &Context, output: &Context) -> Value {
        mapping::scopes(&self.scope(task.route_name.as_deref()), input, output)
    }

    pub fn emit(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Register (or re-score) a timeout check for `task`.
    pub fn register_timeout(&mut self, task: &TaskInfo) {
        if let Some(secs) = task
            .task
            .timeline
            .as_ref()
            .and_then(|t| t.timeout_in_seconds)
        {
            let member = TimeCheckMember::task_timeout(self.execution_id, task.category(), &task.name);
            let due_ms = due_after(self.now_ms, secs);
            self.emit(Effect::AddTimeCheck { member, due_ms });
        }
    }

    /// Schedule a `task_wait_check` for `task` at `due_ms`.
    pub fn register_wait(&mut self, task: &TaskInfo, due_ms: i64) {
        let member = TimeCheckMember::task_wait(self.execution_id, task.category(), &task.name);
        self.emit(Effect::AddTimeCheck { member, due_ms });
    }

    fn io_value(&self, map: &Context) -> Option<Value> {
        self.record_invoke_io.then(|| Value::Object(map.clone()))
    }
}

/// Strategy for one task category.
pub trait TaskRunner: Send + Sync {
    fn category(&self) -> TaskCategory;

    /// Start the task. Called for ready `NotStarted` tasks, after a timeline
    /// wait elapsed, and for every retry attempt.
    fn run(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()>;

    /// Result of an external attempt.
    fn finish(
        &self,
        _cx: &mut RunnerContext<'_>,
        task: &mut TaskInfo,
        _notify: &NotifyInfo,
        _output: Context,
    ) -> Result<()> {
        Err(FlowError::illegal(format!(
            "{} task {} does not accept finish",
            self.category(),
            task.name
        )))
    }

    /// External wakeup.
    fn resume(
        &self,
        _cx: &mut RunnerContext<'_>,
        task: &mut TaskInfo,
        _notify: &NotifyInfo,
        _data: Context,
    ) -> Result<()> {
        Err(FlowError::illegal(format!(
            "{} task {} does not accept wakeup",
            self.category(),
            task.name
        )))
    }

    /// The timeline wait the task was held for elapsed.
    fn wake(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        leave_wait(task)?;
        self.run(cx, task)
    }

    /// The task's timeout check fired while it was still unfinished.
    fn timeout(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        complete(cx, task, TaskStatus::Failed, Some(TIMEOUT_MSG.to_string()), None)
    }

    /// Re-evaluate a running container after its children moved. Returns
    /// whether anything on the container changed.
    fn settle(&self, _cx: &mut RunnerContext<'_>, _task: &mut TaskInfo) -> Result<bool> {
        Ok(false)
    }
}

/// Category → runner lookup table.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<TaskCategory, Arc<dyn TaskRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the runner of every built-in category.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(FunctionRunner))
            .register(Arc::new(ChoiceRunner))
            .register(Arc::new(ForeachRunner))
            .register(Arc::new(PassRunner))
            .register(Arc::new(SuspenseRunner))
            .register(Arc::new(ReturnRunner))
            .register(Arc::new(SwitchRunner));
        registry
    }

    /// Add or replace the runner of its category.
    pub fn register(&mut self, runner: Arc<dyn TaskRunner>) -> &mut Self {
        self.runners.insert(runner.category(), runner);
        self
    }

    pub fn get(&self, category: TaskCategory) -> Result<Arc<dyn TaskRunner>> {
        self.runners
            .get(&category)
            .cloned()
            .ok_or_else(|| FlowError::illegal(format!("no runner registered for {category}")))
    }
}

/// Move the task to RUNNING (if needed) and open a new attempt.
pub fn begin(cx: &RunnerContext<'_>, task: &mut TaskInfo, input: &Context) -> Result<u32> {
    if task.status != TaskStatus::Running {
        task.transition(TaskStatus::Running)?;
    }
    task.pending_wait = None;
    Ok(task.begin_attempt(cx.now_ms, cx.io_value(input)))
}

/// Leave a SUSPENDED hold.
pub fn leave_wait(task: &mut TaskInfo) -> Result<()> {
    if task.status == TaskStatus::Suspended {
        task.transition(TaskStatus::Running)?;
    }
    task.pending_wait = None;
    Ok(())
}

/// Close the current attempt and move to a terminal status. A FAILED
/// outcome of a tolerant task is recorded as SKIPPED. No-op when the task
/// already finished.
pub fn complete(
    cx: &RunnerContext<'_>,
    task: &mut TaskInfo,
    status: TaskStatus,
    msg: Option<String>,
    output: Option<&Context>,
) -> Result<()> {
    if task.status.is_terminal() {
        return Ok(());
    }
    if matches!(task.status, TaskStatus::NotStarted | TaskStatus::Suspended) {
        task.transition(TaskStatus::Running)?;
    }
    task.pending_wait = None;

    let status = if status == TaskStatus::Failed && task.task.tolerance {
        TaskStatus::Skipped
    } else {
        status
    };
    if task.attempts.is_empty() {
        task.begin_attempt(cx.now_ms, None);
    }
    let output = output.and_then(|o| cx.io_value(o));
    task.end_attempt(cx.now_ms, status, msg, output);
    task.transition(status)
}
