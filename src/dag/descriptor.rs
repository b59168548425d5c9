// src/dag/descriptor.rs

//! Static DAG descriptor types.
//!
//! These are the read-only shapes a DAG is submitted with. A descriptor is
//! assumed to be validated by whoever authored it; the engine only checks
//! nesting depth at submit time.
//!
//! JSON example:
//!
//! ```json
//! {
//!   "workspace": "demo",
//!   "dag_name": "greeting",
//!   "tasks": [
//!     { "name": "A", "category": "function", "resource_name": "local://echo", "next": "B" },
//!     { "name": "B", "category": "pass",
//!       "output_mappings": [{ "source": "$.input.msg", "target": "$.context.msg" }] }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::due_after;

/// Task category tag, used to select a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Function,
    Choice,
    Foreach,
    Pass,
    Suspense,
    Return,
    Switch,
}

impl TaskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Function => "function",
            TaskCategory::Choice => "choice",
            TaskCategory::Foreach => "foreach",
            TaskCategory::Pass => "pass",
            TaskCategory::Suspense => "suspense",
            TaskCategory::Return => "return",
            TaskCategory::Switch => "switch",
        }
    }

    /// Categories whose instances own child task trees.
    pub fn is_container(self) -> bool {
        matches!(self, TaskCategory::Choice | TaskCategory::Foreach)
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source → target mapping rule.
///
/// A rule with `reference` set stands for the named rule list in
/// [`Dag::mappings`] and is expanded when the DAG is submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    /// Optional transform expression, interpreted by the mapping capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    /// Missing sources are ignored instead of failing the task.
    #[serde(default)]
    pub tolerance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Mapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Default::default()
        }
    }
}

/// Retry settings attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retry_times: u32,
    #[serde(default)]
    pub interval_in_seconds: i64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_times: 0,
            interval_in_seconds: 0,
            multiplier: default_multiplier(),
        }
    }
}

/// Time-based behaviour of a task or DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_in_seconds: Option<u64>,
    /// Absolute wake time in epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspense_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspense_interval_seconds: Option<u64>,
}

impl Timeline {
    /// Epoch millis at which a wait started at `now_ms` is due, if any wait is
    /// configured. A timestamp takes precedence over an interval.
    pub fn wait_due_ms(&self, now_ms: i64) -> Option<i64> {
        if let Some(ts) = self.suspense_timestamp {
            return Some(ts);
        }
        self.suspense_interval_seconds
            .map(|secs| due_after(now_ms, secs))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionPattern {
    /// The dispatcher answers with the result.
    #[default]
    TaskSync,
    /// The dispatcher only accepts the call; the result arrives through `finish`.
    TaskAsync,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTask {
    pub resource_name: String,
    #[serde(default)]
    pub pattern: FunctionPattern,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fail_conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// `None` always matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub tasks: Vec<BaseTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceTask {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMapping {
    /// Path yielding the array to iterate, e.g. `$.input.items`.
    pub collection: String,
    /// Name under which each item is exposed in its group context.
    pub item: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synchronization {
    pub max_concurrency: usize,
}

/// When a Foreach task is considered done.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// All groups finished.
    #[default]
    LongBoard,
    /// Any group succeeded.
    ShortBoard,
    /// The named sub-tasks succeeded in every group.
    KeyResource { key_tasks: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachTask {
    pub iteration_mapping: IterationMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synchronization: Option<Synchronization>,
    #[serde(default)]
    pub completion: CompletionPolicy,
    #[serde(default)]
    pub tasks: Vec<BaseTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspenseTask {
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub interruptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnTask {
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Comma separated successor names guarded by this switch.
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchTask {
    #[serde(default)]
    pub switches: Vec<Switch>,
}

/// Category specific body of a task, tagged by `category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum TaskKind {
    Function(FunctionTask),
    Choice(ChoiceTask),
    Foreach(ForeachTask),
    Pass,
    Suspense(SuspenseTask),
    Return(ReturnTask),
    Switch(SwitchTask),
}

/// A task as declared in the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseTask {
    pub name: String,
    /// Comma separated successor names within the same scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_mappings: Vec<Mapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_mappings: Vec<Mapping>,
    /// A failure of this task is recorded as SKIPPED.
    #[serde(default)]
    pub tolerance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
    #[serde(flatten)]
    pub kind: TaskKind,
}

impl BaseTask {
    pub fn category(&self) -> TaskCategory {
        match self.kind {
            TaskKind::Function(_) => TaskCategory::Function,
            TaskKind::Choice(_) => TaskCategory::Choice,
            TaskKind::Foreach(_) => TaskCategory::Foreach,
            TaskKind::Pass => TaskCategory::Pass,
            TaskKind::Suspense(_) => TaskCategory::Suspense,
            TaskKind::Return(_) => TaskCategory::Return,
            TaskKind::Switch(_) => TaskCategory::Switch,
        }
    }

    /// Successor names parsed from `next`.
    pub fn next_names(&self) -> Vec<&str> {
        split_names(self.next.as_deref().unwrap_or(""))
    }

    /// Immediate sub-task lists (one per choice for Choice, one for Foreach).
    pub fn sub_task_lists(&self) -> Vec<&Vec<BaseTask>> {
        match &self.kind {
            TaskKind::Choice(choice) => choice.choices.iter().map(|c| &c.tasks).collect(),
            TaskKind::Foreach(foreach) => vec![&foreach.tasks],
            _ => Vec::new(),
        }
    }

    fn sub_task_lists_mut(&mut self) -> Vec<&mut Vec<BaseTask>> {
        match &mut self.kind {
            TaskKind::Choice(choice) => choice.choices.iter_mut().map(|c| &mut c.tasks).collect(),
            TaskKind::Foreach(foreach) => vec![&mut foreach.tasks],
            _ => Vec::new(),
        }
    }

    /// Nesting depth of this task: 1 for a leaf, 1 + deepest child otherwise.
    pub fn depth(&self) -> usize {
        1 + self
            .sub_task_lists()
            .into_iter()
            .flat_map(|tasks| tasks.iter())
            .map(BaseTask::depth)
            .max()
            .unwrap_or(0)
    }
}

/// Split a comma separated name list, dropping empty entries.
pub fn split_names(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// A DAG descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    #[serde(default)]
    pub workspace: String,
    pub dag_name: String,
    pub tasks: Vec<BaseTask>,
    /// Reusable mapping rule lists, referenced by name from tasks.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mappings: BTreeMap<String, Vec<Mapping>>,
    /// Named resources, referenced as `resource://<name>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
    /// Root task names whose joint success raises `DAG_KEY_SUCCEED`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_tasks: Vec<String>,
}

impl Dag {
    /// Deepest nesting level across all root tasks.
    pub fn depth(&self) -> usize {
        self.tasks.iter().map(BaseTask::depth).max().unwrap_or(0)
    }

    /// Replace every `reference` mapping with the referenced rule list.
    ///
    /// Unknown references are kept out of the result and reported by name.
    pub fn expand_mapping_references(&mut self) -> Vec<String> {
        let library = self.mappings.clone();
        let mut unknown = Vec::new();
        for task in self.tasks.iter_mut() {
            expand_task(task, &library, &mut unknown);
        }
        unknown
    }
}

fn expand_task(
    task: &mut BaseTask,
    library: &BTreeMap<String, Vec<Mapping>>,
    unknown: &mut Vec<String>,
) {
    task.input_mappings = expand_rules(&task.input_mappings, library, unknown);
    task.output_mappings = expand_rules(&task.output_mappings, library, unknown);
    for list in task.sub_task_lists_mut() {
        for sub in list.iter_mut() {
            expand_task(sub, library, unknown);
        }
    }
}

fn expand_rules(
    rules: &[Mapping],
    library: &BTreeMap<String, Vec<Mapping>>,
    unknown: &mut Vec<String>,
) -> Vec<Mapping> {
    let mut out = Vec::with_capacity(rules.len());
    for rule in rules {
        match &rule.reference {
            None => out.push(rule.clone()),
            Some(name) => match library.get(name) {
                Some(referenced) => out.extend(referenced.iter().cloned()),
                None => unknown.push(name.clone()),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_tagged_categories() {
        let dag: Dag = serde_json::from_value(json!({
            "dag_name": "d",
            "tasks": [
                { "name": "A", "category": "function", "resource_name": "local://echo", "next": "B, C" },
                { "name": "B", "category": "pass" },
                { "name": "C", "category": "foreach",
                  "iteration_mapping": { "collection": "$.input.items", "item": "it" },
                  "completion": { "policy": "short_board" },
                  "tasks": [ { "name": "x", "category": "pass" } ] }
            ]
        }))
        .unwrap();

        assert_eq!(dag.tasks[0].category(), TaskCategory::Function);
        assert_eq!(dag.tasks[0].next_names(), vec!["B", "C"]);
        assert_eq!(dag.tasks[1].kind, TaskKind::Pass);
        assert_eq!(dag.depth(), 2);
        match &dag.tasks[2].kind {
            TaskKind::Foreach(f) => assert_eq!(f.completion, CompletionPolicy::ShortBoard),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn expands_mapping_references_recursively() {
        let mut dag: Dag = serde_json::from_value(json!({
            "dag_name": "d",
            "mappings": { "common": [ { "source": "$.context.a", "target": "$.input.a" } ] },
            "tasks": [
                { "name": "C", "category": "choice", "choices": [
                    { "tasks": [ { "name": "x", "category": "pass",
                                   "input_mappings": [ { "reference": "common" }, { "reference": "nope" } ] } ] }
                ] }
            ]
        }))
        .unwrap();

        let unknown = dag.expand_mapping_references();
        assert_eq!(unknown, vec!["nope".to_string()]);
        let sub = &dag.tasks[0].sub_task_lists()[0][0];
        assert_eq!(sub.input_mappings, vec![Mapping::new("$.context.a", "$.input.a")]);
    }

    #[test]
    fn timestamp_wins_over_interval() {
        let tl = Timeline {
            suspense_timestamp: Some(42),
            suspense_interval_seconds: Some(5),
            ..Default::default()
        };
        assert_eq!(tl.wait_due_ms(1_000), Some(42));
        let tl = Timeline {
            suspense_interval_seconds: Some(5),
            ..Default::default()
        };
        assert_eq!(tl.wait_due_ms(1_000), Some(6_000));
    }
}
