#![allow(dead_code)]

use std::collections::BTreeMap;

use flowdag::dag::{
    BaseTask, Choice, ChoiceTask, CompletionPolicy, Dag, ForeachTask, FunctionPattern,
    FunctionTask, IterationMapping, Mapping, RetryConfig, ReturnTask, SuspenseTask, Switch,
    SwitchTask, Synchronization, TaskKind, Timeline,
};

/// Builder for `Dag` to simplify test setup.
pub struct DagBuilder {
    dag: Dag,
}

impl DagBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            dag: Dag {
                workspace: "test".to_string(),
                dag_name: name.to_string(),
                tasks: Vec::new(),
                mappings: BTreeMap::new(),
                resources: BTreeMap::new(),
                timeline: None,
                key_tasks: Vec::new(),
            },
        }
    }

    pub fn task(mut self, task: BaseTask) -> Self {
        self.dag.tasks.push(task);
        self
    }

    pub fn key_task(mut self, name: &str) -> Self {
        self.dag.key_tasks.push(name.to_string());
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.dag.timeline = Some(Timeline {
            timeout_in_seconds: Some(seconds),
            ..Default::default()
        });
        self
    }

    pub fn resource(mut self, name: &str, target: &str) -> Self {
        self.dag
            .resources
            .insert(name.to_string(), target.to_string());
        self
    }

    pub fn mapping(mut self, name: &str, rules: Vec<Mapping>) -> Self {
        self.dag.mappings.insert(name.to_string(), rules);
        self
    }

    pub fn build(self) -> Dag {
        self.dag
    }
}

/// Builder for `BaseTask`, one constructor per category.
pub struct TaskBuilder {
    task: BaseTask,
}

impl TaskBuilder {
    fn with_kind(name: &str, kind: TaskKind) -> Self {
        Self {
            task: BaseTask {
                name: name.to_string(),
                next: None,
                input_mappings: Vec::new(),
                output_mappings: Vec::new(),
                tolerance: false,
                retry: None,
                timeline: None,
                kind,
            },
        }
    }

    pub fn function(name: &str, resource: &str) -> Self {
        Self::with_kind(
            name,
            TaskKind::Function(FunctionTask {
                resource_name: resource.to_string(),
                pattern: FunctionPattern::TaskSync,
                success_conditions: Vec::new(),
                fail_conditions: Vec::new(),
            }),
        )
    }

    pub fn pass(name: &str) -> Self {
        Self::with_kind(name, TaskKind::Pass)
    }

    pub fn suspense(name: &str, conditions: &[&str]) -> Self {
        Self::with_kind(
            name,
            TaskKind::Suspense(SuspenseTask {
                conditions: strings(conditions),
                interruptions: Vec::new(),
            }),
        )
    }

    pub fn ret(name: &str, conditions: &[&str]) -> Self {
        Self::with_kind(
            name,
            TaskKind::Return(ReturnTask {
                conditions: strings(conditions),
            }),
        )
    }

    /// `(condition, comma separated successors)` pairs.
    pub fn switch(name: &str, switches: &[(Option<&str>, &str)]) -> Self {
        Self::with_kind(
            name,
            TaskKind::Switch(SwitchTask {
                switches: switches
                    .iter()
                    .map(|(condition, next)| Switch {
                        condition: condition.map(str::to_string),
                        next: next.to_string(),
                    })
                    .collect(),
            }),
        )
    }

    pub fn choice(name: &str, choices: Vec<(Option<&str>, Vec<BaseTask>)>) -> Self {
        Self::with_kind(
            name,
            TaskKind::Choice(ChoiceTask {
                choices: choices
                    .into_iter()
                    .map(|(condition, tasks)| Choice {
                        condition: condition.map(str::to_string),
                        tasks,
                    })
                    .collect(),
            }),
        )
    }

    pub fn foreach(name: &str, collection: &str, item: &str, tasks: Vec<BaseTask>) -> Self {
        Self::with_kind(
            name,
            TaskKind::Foreach(ForeachTask {
                iteration_mapping: IterationMapping {
                    collection: collection.to_string(),
                    item: item.to_string(),
                },
                synchronization: None,
                completion: CompletionPolicy::LongBoard,
                tasks,
            }),
        )
    }

    pub fn next(mut self, next: &str) -> Self {
        self.task.next = Some(next.to_string());
        self
    }

    pub fn input(mut self, source: &str, target: &str) -> Self {
        self.task.input_mappings.push(Mapping::new(source, target));
        self
    }

    pub fn output(mut self, source: &str, target: &str) -> Self {
        self.task.output_mappings.push(Mapping::new(source, target));
        self
    }

    pub fn input_reference(mut self, reference: &str) -> Self {
        self.task.input_mappings.push(Mapping {
            reference: Some(reference.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn tolerance(mut self) -> Self {
        self.task.tolerance = true;
        self
    }

    pub fn retry(mut self, max_retry_times: u32, interval_in_seconds: i64, multiplier: f64) -> Self {
        self.task.retry = Some(RetryConfig {
            max_retry_times,
            interval_in_seconds,
            multiplier,
        });
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeline().timeout_in_seconds = Some(seconds);
        self
    }

    pub fn wait_interval(mut self, seconds: u64) -> Self {
        self.timeline().suspense_interval_seconds = Some(seconds);
        self
    }

    pub fn success_conditions(mut self, conditions: &[&str]) -> Self {
        if let TaskKind::Function(f) = &mut self.task.kind {
            f.success_conditions = strings(conditions);
        }
        self
    }

    pub fn fail_conditions(mut self, conditions: &[&str]) -> Self {
        if let TaskKind::Function(f) = &mut self.task.kind {
            f.fail_conditions = strings(conditions);
        }
        self
    }

    pub fn interruptions(mut self, conditions: &[&str]) -> Self {
        if let TaskKind::Suspense(s) = &mut self.task.kind {
            s.interruptions = strings(conditions);
        }
        self
    }

    pub fn completion(mut self, policy: CompletionPolicy) -> Self {
        if let TaskKind::Foreach(f) = &mut self.task.kind {
            f.completion = policy;
        }
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        if let TaskKind::Foreach(f) = &mut self.task.kind {
            f.synchronization = Some(Synchronization { max_concurrency });
        }
        self
    }

    pub fn build(self) -> BaseTask {
        self.task
    }

    fn timeline(&mut self) -> &mut Timeline {
        self.task.timeline.get_or_insert_with(Timeline::default)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
