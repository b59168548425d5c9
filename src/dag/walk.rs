// src/dag/walk.rs

//! Read-only queries over a scope of task instances.
//!
//! This is the canonical home of the join rule and of the status
//! calculations for groups and whole executions. Everything here is pure;
//! mutations happen in `engine::core`.

use std::collections::BTreeMap;

use crate::dag::dag_info::DagInfo;
use crate::dag::graph::ScopeGraph;
use crate::dag::status::{DagStatus, TaskStatus};
use crate::dag::task_info::TaskInfo;

/// A `NotStarted` task whose predecessors all reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyTask {
    pub name: String,
    /// Every incoming edge is skipped: propagate SKIPPED without running.
    pub skip: bool,
}

/// Edge `pred -> task` carries no work: the predecessor was skipped, or it
/// is a Switch that vetoed this successor.
fn edge_skipped(pred: &TaskInfo, task: &TaskInfo) -> bool {
    pred.status == TaskStatus::Skipped || pred.skip_next.contains(task.base_name())
}

/// Whether the group a child belongs to is currently active.
fn group_active(task: &TaskInfo, groups: Option<&BTreeMap<usize, TaskStatus>>) -> bool {
    match (groups, task.group_index) {
        (Some(groups), Some(index)) => groups.get(&index) == Some(&TaskStatus::Running),
        _ => true,
    }
}

/// Tasks of a scope that may be evaluated now (the AND-join).
///
/// A task is ready when it is `NotStarted`, its group (if any) is active and
/// every predecessor is terminal. A non-tolerated FAILED predecessor blocks
/// the join for good; tolerated failures are recorded as SKIPPED upstream
/// and therefore count as skipped edges here.
pub fn ready_tasks(
    tasks: &BTreeMap<String, TaskInfo>,
    groups: Option<&BTreeMap<usize, TaskStatus>>,
) -> Vec<ReadyTask> {
    let graph = ScopeGraph::from_tasks(tasks);
    let mut ready = Vec::new();

    for (name, info) in tasks.iter() {
        if info.status != TaskStatus::NotStarted || !group_active(info, groups) {
            continue;
        }

        let preds: Vec<&TaskInfo> = graph
            .predecessors_of(name)
            .into_iter()
            .filter_map(|p| tasks.get(p))
            .collect();

        let all_terminal = preds.iter().all(|p| p.status.is_terminal());
        let any_failed = preds.iter().any(|p| p.status == TaskStatus::Failed);
        if !all_terminal || any_failed {
            continue;
        }

        let skip = !preds.is_empty() && preds.iter().all(|p| edge_skipped(p, info));
        ready.push(ReadyTask {
            name: name.clone(),
            skip,
        });
    }

    ready
}

/// Status of a set of sibling tasks taken together.
///
/// - empty, or all SUCCEED/SKIPPED → SUCCEED
/// - anything in flight or still able to start → RUNNING
/// - otherwise, any FAILED → FAILED
/// - otherwise RUNNING
pub fn group_status<'a>(members: impl IntoIterator<Item = &'a TaskInfo>) -> TaskStatus {
    let members: Vec<&TaskInfo> = members.into_iter().collect();
    if members.iter().all(|t| t.status.is_success_or_skip()) {
        return TaskStatus::Succeed;
    }
    if members.iter().any(|t| t.status.is_in_flight()) {
        return TaskStatus::Running;
    }

    // Rebuild a scope map to reuse the join rule for "can still start".
    let scope: BTreeMap<String, TaskInfo> = members
        .iter()
        .map(|t| (t.name.clone(), (*t).clone()))
        .collect();
    if !ready_tasks(&scope, None).is_empty() {
        return TaskStatus::Running;
    }
    if members.iter().any(|t| t.status == TaskStatus::Failed) {
        return TaskStatus::Failed;
    }
    TaskStatus::Running
}

/// First non-tolerated failure in the root scope, for error reporting.
pub fn first_failure(info: &DagInfo) -> Option<&TaskInfo> {
    info.tasks
        .values()
        .find(|t| t.status == TaskStatus::Failed)
}

/// Instance-level status after a traversal step.
///
/// - a root Return fired → SUCCEED
/// - root scope settled: all SUCCEED/SKIPPED → SUCCEED, else FAILED
/// - key tasks declared and all SUCCEED/SKIPPED with no failure → KEY_SUCCEED
/// - otherwise RUNNING
pub fn dag_status(info: &DagInfo) -> DagStatus {
    if info.returned {
        return DagStatus::Succeed;
    }

    match group_status(info.tasks.values()) {
        TaskStatus::Succeed => return DagStatus::Succeed,
        TaskStatus::Failed => return DagStatus::Failed,
        _ => {}
    }

    if key_tasks_succeeded(info) {
        return DagStatus::KeySucceed;
    }
    DagStatus::Running
}

fn key_tasks_succeeded(info: &DagInfo) -> bool {
    if info.dag.key_tasks.is_empty() {
        return false;
    }
    if info.tasks.values().any(|t| t.status == TaskStatus::Failed) {
        return false;
    }
    info.dag.key_tasks.iter().all(|name| {
        info.tasks
            .get(name)
            .is_some_and(|t| t.status.is_success_or_skip())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::descriptor::{BaseTask, TaskKind};

    fn scope(spec: &[(&str, Option<&str>, TaskStatus)]) -> BTreeMap<String, TaskInfo> {
        spec.iter()
            .map(|(name, next, status)| {
                let task = BaseTask {
                    name: name.to_string(),
                    next: next.map(str::to_string),
                    input_mappings: vec![],
                    output_mappings: vec![],
                    tolerance: false,
                    retry: None,
                    timeline: None,
                    kind: TaskKind::Pass,
                };
                let mut info = TaskInfo::root(task);
                info.status = *status;
                (name.to_string(), info)
            })
            .collect()
    }

    use TaskStatus::*;

    #[test]
    fn join_waits_for_every_predecessor() {
        let tasks = scope(&[
            ("B", Some("D"), Succeed),
            ("C", Some("D"), Running),
            ("D", None, NotStarted),
        ]);
        assert!(ready_tasks(&tasks, None).is_empty());

        let tasks = scope(&[
            ("B", Some("D"), Succeed),
            ("C", Some("D"), Skipped),
            ("D", None, NotStarted),
        ]);
        assert_eq!(
            ready_tasks(&tasks, None),
            vec![ReadyTask { name: "D".into(), skip: false }]
        );
    }

    #[test]
    fn all_skipped_predecessors_propagate_skip() {
        let tasks = scope(&[
            ("B", Some("D"), Skipped),
            ("C", Some("D"), Skipped),
            ("D", None, NotStarted),
        ]);
        assert_eq!(
            ready_tasks(&tasks, None),
            vec![ReadyTask { name: "D".into(), skip: true }]
        );
    }

    #[test]
    fn failed_predecessor_blocks_join_and_fails_group() {
        let tasks = scope(&[
            ("B", Some("D"), Failed),
            ("C", Some("D"), Succeed),
            ("D", None, NotStarted),
        ]);
        assert!(ready_tasks(&tasks, None).is_empty());
        assert_eq!(group_status(tasks.values()), Failed);
    }

    #[test]
    fn switch_veto_counts_as_skipped_edge() {
        let mut tasks = scope(&[("S", Some("X"), Succeed), ("X", None, NotStarted)]);
        tasks.get_mut("S").unwrap().skip_next.insert("X".into());
        assert_eq!(
            ready_tasks(&tasks, None),
            vec![ReadyTask { name: "X".into(), skip: true }]
        );
    }

    #[test]
    fn group_status_rules() {
        assert_eq!(group_status(scope(&[]).values()), Succeed);
        let running = scope(&[("A", Some("B"), Succeed), ("B", None, NotStarted)]);
        assert_eq!(group_status(running.values()), Running);
        let suspended = scope(&[("A", None, Suspended)]);
        assert_eq!(group_status(suspended.values()), Running);
    }
}
