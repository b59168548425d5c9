// src/engine/core.rs

//! Pure traversal core.
//!
//! [`TraversalCore::apply`] takes one [`FlowEvent`] for an execution whose
//! `DagInfo` and context are already loaded (and locked), hands the
//! addressed task to its runner, then cascades: containers settle, ready
//! tasks start or inherit SKIPPED, until a pass changes nothing. It returns
//! the effects to carry out and the callback notifications to emit.
//!
//! Nothing in here awaits or does IO, so every rule can be exercised in
//! plain unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::checker::TimeCheckMember;
use crate::clock::due_after;
use crate::dag::task_info::{find_in_mut, parent_name};
use crate::dag::walk::{self, dag_status, first_failure};
use crate::dag::{
    DagEvent, DagInfo, DagStatus, NotifyInfo, PendingWait, ScopeGraph, TaskCategory, TaskInfo,
    TaskStatus,
};
use crate::engine::{CoreStep, Effect, FlowEvent, NORMAL_SKIP_MSG, Notification, TIMEOUT_MSG};
use crate::errors::{FlowError, Result};
use crate::mapping::Mapper;
use crate::retry::RetryPolicy;
use crate::runners::{RunnerContext, RunnerRegistry, complete, return_task};
use crate::types::Context;

type Snapshot = BTreeMap<String, (TaskStatus, Option<PendingWait>)>;

fn snapshot(info: &DagInfo) -> Snapshot {
    info.all_tasks()
        .into_iter()
        .map(|t| (t.name.clone(), (t.status, t.pending_wait)))
        .collect()
}

fn has_timeout(task: &TaskInfo) -> bool {
    task.task
        .timeline
        .as_ref()
        .is_some_and(|t| t.timeout_in_seconds.is_some())
}

fn dag_timeout_seconds(info: &DagInfo) -> Option<u64> {
    info.settings
        .timeout_seconds
        .or_else(|| info.dag.timeline.as_ref().and_then(|t| t.timeout_in_seconds))
}

/// Task map of the scope `route` lives in (the root map for `None`).
fn scope_mut<'a>(
    tasks: &'a mut BTreeMap<String, TaskInfo>,
    route: Option<&str>,
) -> Result<&'a mut BTreeMap<String, TaskInfo>> {
    match route {
        None => Ok(tasks),
        Some(route) => {
            let parent = parent_name(route);
            find_in_mut(tasks, parent)
                .map(|t| &mut t.children)
                .ok_or_else(|| FlowError::illegal(format!("container {parent} not found")))
        }
    }
}

pub struct TraversalCore {
    runners: RunnerRegistry,
    mapper: Arc<dyn Mapper>,
    retry: Arc<dyn RetryPolicy>,
    record_invoke_io: bool,
}

impl TraversalCore {
    pub fn new(
        runners: RunnerRegistry,
        mapper: Arc<dyn Mapper>,
        retry: Arc<dyn RetryPolicy>,
        record_invoke_io: bool,
    ) -> Self {
        Self {
            runners,
            mapper,
            retry,
            record_invoke_io,
        }
    }

    /// Apply one event and cascade to a fixpoint.
    pub fn apply(
        &self,
        info: &mut DagInfo,
        context: &mut Context,
        event: FlowEvent,
        now_ms: i64,
    ) -> Result<CoreStep> {
        if info.status.is_terminal() {
            if event.is_timer() {
                debug!(execution_id = %info.execution_id, event = event.kind(), "execution already completed, timer ignored");
                return Ok(CoreStep::default());
            }
            if !matches!(event, FlowEvent::Redo { .. }) {
                info.ensure_not_terminal()?;
            }
        }

        let mut effects = Vec::new();
        if let FlowEvent::Redo { notify, data } = &event {
            self.prepare_redo(info, context, notify, data, &mut effects)?;
        }

        let before = snapshot(info);
        let dag_before = info.status;
        let execution_id = info.execution_id.clone();
        let resources = info.dag.resources.clone();
        let mut returned = info.returned;

        if let FlowEvent::Submit { .. } = &event {
            info.status = DagStatus::Running;
            if let Some(secs) = dag_timeout_seconds(info) {
                effects.push(Effect::AddTimeCheck {
                    member: TimeCheckMember::dag_timeout(&execution_id),
                    due_ms: due_after(now_ms, secs),
                });
            }
        }

        {
            let mut cx = RunnerContext {
                execution_id: &execution_id,
                context,
                resources: &resources,
                mapper: self.mapper.as_ref(),
                retry: self.retry.as_ref(),
                record_invoke_io: self.record_invoke_io,
                now_ms,
                effects: &mut effects,
            };

            let mut cascade = true;
            match event {
                FlowEvent::Submit { data } => {
                    cx.context.extend(data);
                }
                FlowEvent::Finish { notify, data } => {
                    let task = info.task_mut(Self::addressed(&notify)?)?;
                    let runner = self.runners.get(task.category())?;
                    let result = runner.finish(&mut cx, task, &notify, data);
                    Self::guard(&mut cx, task, result)?;
                }
                FlowEvent::Wakeup { notify, data } => {
                    let task = info.task_mut(Self::addressed(&notify)?)?;
                    let runner = self.runners.get(task.category())?;
                    let result = if task.category() == TaskCategory::Suspense {
                        runner.resume(&mut cx, task, &notify, data)
                    } else if task.pending_wait == Some(PendingWait::Delay) {
                        runner.wake(&mut cx, task)
                    } else {
                        return Err(FlowError::illegal(format!(
                            "task {} is not waiting for a wakeup",
                            task.name
                        )));
                    };
                    Self::guard(&mut cx, task, result)?;
                }
                FlowEvent::Redo { .. } => {}
                FlowEvent::TaskTimeout { task } => match info.find_task_mut(&task) {
                    Some(task) if !task.status.is_terminal() => {
                        info!(execution_id = %execution_id, task = %task.name, "task timed out");
                        let runner = self.runners.get(task.category())?;
                        let result = runner.timeout(&mut cx, task);
                        Self::guard(&mut cx, task, result)?;
                    }
                    _ => debug!(execution_id = %execution_id, task = %task, "timeout for finished or unknown task ignored"),
                },
                FlowEvent::TaskWait { task } => match info.find_task_mut(&task) {
                    Some(task) if task.pending_wait.is_some() => {
                        let runner = self.runners.get(task.category())?;
                        let result = match task.pending_wait {
                            Some(PendingWait::Retry) => runner.run(&mut cx, task),
                            _ => runner.wake(&mut cx, task),
                        };
                        Self::guard(&mut cx, task, result)?;
                    }
                    _ => debug!(execution_id = %execution_id, task = %task, "wait for task no longer pending ignored"),
                },
                FlowEvent::DagTimeout => {
                    info!(execution_id = %execution_id, "execution timed out");
                    info.status = DagStatus::Failed;
                    info.msg = Some(TIMEOUT_MSG.to_string());
                    cascade = false;
                }
            }

            if cascade {
                self.advance(&mut cx, &mut info.tasks, None, &mut returned)?;
            }
        }

        info.returned = returned;
        info.updated_at_ms = now_ms;
        Ok(Self::finalize(info, &before, dag_before, effects))
    }

    fn addressed(notify: &NotifyInfo) -> Result<&str> {
        notify
            .task_name
            .as_deref()
            .ok_or_else(|| FlowError::illegal("notification does not name a task"))
    }

    /// Turn runner errors into task failures, except for errors about the
    /// request itself, which go back to the caller.
    fn guard(cx: &mut RunnerContext<'_>, task: &mut TaskInfo, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err @ (FlowError::IllegalState(_) | FlowError::TaskNotFound { .. })) => Err(err),
            Err(err) => {
                warn!(execution_id = %cx.execution_id, task = %task.name, error = %err, "task failed");
                complete(cx, task, TaskStatus::Failed, Some(err.to_string()), None)
            }
        }
    }

    /// Start a ready task: hold it for its timeline wait, or hand it to its
    /// runner.
    fn start(&self, cx: &mut RunnerContext<'_>, task: &mut TaskInfo) -> Result<()> {
        let runner = self.runners.get(task.category())?;
        let category = task.category();

        if category != TaskCategory::Suspense {
            let due = task
                .task
                .timeline
                .as_ref()
                .and_then(|t| t.wait_due_ms(cx.now_ms));
            if let Some(due_ms) = due {
                task.transition(TaskStatus::Running)?;
                task.transition(TaskStatus::Suspended)?;
                task.pending_wait = Some(PendingWait::Delay);
                cx.register_wait(task, due_ms);
                debug!(execution_id = %cx.execution_id, task = %task.name, due_ms, "task held for timeline wait");
                return Ok(());
            }
        }
        if category != TaskCategory::Function {
            cx.register_timeout(task);
        }

        let result = runner.run(cx, task);
        Self::guard(cx, task, result)
    }

    /// Cascade within one scope until nothing moves. Returns whether
    /// anything moved.
    fn advance(
        &self,
        cx: &mut RunnerContext<'_>,
        tasks: &mut BTreeMap<String, TaskInfo>,
        groups: Option<&BTreeMap<usize, TaskStatus>>,
        returned: &mut bool,
    ) -> Result<bool> {
        let root = groups.is_none();
        let mut moved = false;

        loop {
            let mut progressed = false;

            let containers: Vec<String> = tasks
                .values()
                .filter(|t| {
                    t.is_container() && t.status == TaskStatus::Running && t.pending_wait.is_none()
                })
                .map(|t| t.name.clone())
                .collect();
            for name in containers {
                let Some(container) = tasks.get_mut(&name) else {
                    continue;
                };
                let runner = self.runners.get(container.category())?;
                let mut nested_return = false;
                if self.advance(
                    cx,
                    &mut container.children,
                    Some(&container.groups),
                    &mut nested_return,
                )? {
                    progressed = true;
                }
                if runner.settle(cx, container)? {
                    progressed = true;
                }
            }

            for ready in walk::ready_tasks(tasks, groups) {
                let Some(task) = tasks.get_mut(&ready.name) else {
                    continue;
                };
                if task.status != TaskStatus::NotStarted {
                    continue;
                }
                progressed = true;

                if ready.skip {
                    debug!(execution_id = %cx.execution_id, task = %task.name, "all incoming edges skipped");
                    task.skip(NORMAL_SKIP_MSG)?;
                    continue;
                }

                self.start(cx, task)?;
                if return_task::fired(task) {
                    let route = task.route_name.clone();
                    let name = task.name.clone();
                    for sibling in tasks.values_mut() {
                        if sibling.route_name == route
                            && sibling.name != name
                            && sibling.status == TaskStatus::NotStarted
                        {
                            sibling.skip(NORMAL_SKIP_MSG)?;
                        }
                    }
                    if root {
                        *returned = true;
                    }
                }
            }

            if !progressed {
                break;
            }
            moved = true;
            if *returned {
                break;
            }
        }

        Ok(moved)
    }

    /// Reset the addressed tasks (every FAILED task when none are named)
    /// and everything downstream of them, reopen enclosing containers and
    /// the execution, and merge `data` into the context.
    fn prepare_redo(
        &self,
        info: &mut DagInfo,
        context: &mut Context,
        notify: &NotifyInfo,
        data: &Context,
        effects: &mut Vec<Effect>,
    ) -> Result<()> {
        let targets: Vec<String> = if notify.task_names.is_empty() {
            info.all_tasks()
                .into_iter()
                .filter(|t| t.status == TaskStatus::Failed)
                .map(|t| t.name.clone())
                .collect()
        } else {
            for name in &notify.task_names {
                info.task(name)?;
            }
            notify.task_names.clone()
        };
        if targets.is_empty() {
            return Err(FlowError::illegal(format!(
                "execution {} has nothing to redo",
                info.execution_id
            )));
        }

        let execution_id = info.execution_id.clone();
        for name in targets {
            // Already reset together with an enclosing container.
            let Some(task) = info.find_task(&name) else {
                continue;
            };
            let mut route = task.route_name.clone();
            let mut group_index = task.group_index;

            let scope = scope_mut(&mut info.tasks, route.as_deref())?;
            Self::reset_downstream(scope, &name, true, &execution_id, effects);

            while let (Some(current), Some(index)) = (route.clone(), group_index) {
                let parent = parent_name(&current).to_string();
                let Some(container) = info.find_task_mut(&parent) else {
                    break;
                };
                container.groups.insert(index, TaskStatus::Running);
                container.status = TaskStatus::Running;
                container.msg = None;
                container.pending_wait = None;
                route = container.route_name.clone();
                group_index = container.group_index;

                let scope = scope_mut(&mut info.tasks, route.as_deref())?;
                Self::reset_downstream(scope, &parent, false, &execution_id, effects);
            }
        }

        info!(execution_id = %execution_id, "execution reopened for redo");
        info.status = DagStatus::Running;
        info.msg = None;
        info.failed_task = None;
        info.returned = false;
        context.extend(data.clone());
        Ok(())
    }

    fn reset_downstream(
        scope: &mut BTreeMap<String, TaskInfo>,
        from: &str,
        include_self: bool,
        execution_id: &str,
        effects: &mut Vec<Effect>,
    ) {
        let closure = ScopeGraph::from_tasks(scope).downstream_closure([from]);
        for name in closure {
            if name == from && !include_self {
                continue;
            }
            if let Some(task) = scope.get_mut(&name) {
                task.walk(&mut |t| {
                    if t.pending_wait.is_some() {
                        effects.push(Effect::RemoveTimeCheck(TimeCheckMember::task_wait(
                            execution_id,
                            t.category(),
                            &t.name,
                        )));
                    }
                    if has_timeout(t) && !t.status.is_terminal() {
                        effects.push(Effect::RemoveTimeCheck(TimeCheckMember::task_timeout(
                            execution_id,
                            t.category(),
                            &t.name,
                        )));
                    }
                });
                task.reset();
            }
        }
    }

    /// Compare against the pre-step snapshot: task events, time check
    /// clean-up, and the execution level status.
    fn finalize(
        info: &mut DagInfo,
        before: &Snapshot,
        dag_before: DagStatus,
        effects: Vec<Effect>,
    ) -> CoreStep {
        let mut notifications = Vec::new();
        let mut removals = Vec::new();

        for task in info.all_tasks() {
            let (prev_status, prev_wait) = before
                .get(&task.name)
                .copied()
                .unwrap_or((TaskStatus::NotStarted, None));

            if prev_status != task.status && task.status.is_terminal() {
                if let Some(event) = DagEvent::for_task_status(task.status) {
                    notifications.push(Notification {
                        event,
                        task: Some(task.clone()),
                    });
                }
                if has_timeout(task) {
                    removals.push(Effect::RemoveTimeCheck(TimeCheckMember::task_timeout(
                        &info.execution_id,
                        task.category(),
                        &task.name,
                    )));
                }
            }
            if prev_wait.is_some() && task.pending_wait.is_none() {
                removals.push(Effect::RemoveTimeCheck(TimeCheckMember::task_wait(
                    &info.execution_id,
                    task.category(),
                    &task.name,
                )));
            }
        }

        if !info.status.is_terminal() {
            match dag_status(info) {
                DagStatus::KeySucceed => {
                    info.status = DagStatus::KeySucceed;
                    if !info.key_succeed_notified {
                        info.key_succeed_notified = true;
                        notifications.push(Notification {
                            event: DagEvent::DagKeySucceed,
                            task: None,
                        });
                    }
                }
                status => info.status = status,
            }
        }

        if info.status.is_terminal() && !dag_before.is_terminal() {
            if info.status == DagStatus::Failed && info.msg.is_none() {
                if let Some((msg, name)) =
                    first_failure(info).map(|f| (f.msg.clone(), f.name.clone()))
                {
                    info.msg = msg;
                    info.failed_task = Some(name);
                }
            }
            if dag_timeout_seconds(info).is_some() {
                removals.push(Effect::RemoveTimeCheck(TimeCheckMember::dag_timeout(
                    &info.execution_id,
                )));
            }
            let event = if info.status == DagStatus::Succeed {
                DagEvent::DagSucceed
            } else {
                DagEvent::DagFailed
            };
            info!(execution_id = %info.execution_id, status = ?info.status, msg = ?info.msg, "execution completed");
            notifications.push(Notification { event, task: None });
        }

        // Clean-up goes last: a check registered and settled within the
        // same step must not outlive it.
        let mut effects = effects;
        effects.extend(removals);
        CoreStep {
            effects,
            notifications,
        }
    }
}
