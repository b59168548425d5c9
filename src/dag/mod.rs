// src/dag/mod.rs

//! DAG data model.
//!
//! - [`descriptor`] holds the static, submitted DAG shape.
//! - [`status`] defines the task/DAG status lattices and event codes.
//! - [`task_info`] and [`dag_info`] are the runtime state persisted per
//!   execution.
//! - [`notify`] carries transient event payloads.
//! - [`graph`] builds the per-scope dependency graph.
//! - [`walk`] answers read-only questions (ready tasks, group and DAG status).

pub mod dag_info;
pub mod descriptor;
pub mod graph;
pub mod notify;
pub mod status;
pub mod task_info;
pub mod walk;

pub use dag_info::{DagInfo, DagSettings};
pub use descriptor::{
    BaseTask, Choice, ChoiceTask, CompletionPolicy, Dag, ForeachTask, FunctionPattern,
    FunctionTask, IterationMapping, Mapping, RetryConfig, ReturnTask, SuspenseTask, Switch,
    SwitchTask, Synchronization, TaskCategory, TaskKind, Timeline,
};
pub use graph::ScopeGraph;
pub use notify::{NotifyInfo, RetryContext};
pub use status::{DagEvent, DagStatus, TaskStatus};
pub use task_info::{InvokeAttempt, PendingWait, TaskInfo};
