// src/dispatch/mod.rs

//! Dispatcher contract for Function tasks.
//!
//! The engine hands every Function attempt to a [`Dispatcher`] *outside* the
//! instance lock. A dispatcher either answers with the result right away
//! ([`DispatchResponse::Completed`]) or only accepts the call
//! ([`DispatchResponse::Accepted`]) and the result later arrives through
//! `finish`. An `Err` is treated as a failed attempt.
//!
//! [`DispatcherRegistry`] resolves the concrete dispatcher by task category,
//! then by the scheme of the target resource (`local://echo` → `local`).

pub mod local;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dag::{FunctionPattern, TaskCategory};
use crate::errors::{FlowError, Result};
use crate::types::{BoxFuture, Context};

pub use local::LocalDispatcher;

/// Scheme key matching any resource of a category.
pub const ANY_SCHEME: &str = "*";

/// One dispatch request, produced by the Function runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchInfo {
    pub execution_id: String,
    pub task_name: String,
    pub category: TaskCategory,
    /// Resolved target resource.
    pub resource: String,
    pub pattern: FunctionPattern,
    pub input: Context,
    /// Attempt number; echoed back on finish so stale answers can be dropped.
    pub attempt: u32,
}

impl DispatchInfo {
    /// `scheme` of a `scheme://rest` resource.
    pub fn scheme(&self) -> Option<&str> {
        resource_scheme(&self.resource)
    }
}

pub fn resource_scheme(resource: &str) -> Option<&str> {
    resource.split_once("://").map(|(scheme, _)| scheme)
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResponse {
    /// The call finished; feed `output` back as the task output.
    Completed { output: Context },
    /// The call was accepted; a `finish` event will follow.
    Accepted,
}

pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, category: TaskCategory, info: DispatchInfo)
    -> BoxFuture<'_, Result<DispatchResponse>>;
}

/// Category → scheme → dispatcher lookup table.
#[derive(Default, Clone)]
pub struct DispatcherRegistry {
    table: HashMap<TaskCategory, HashMap<String, Arc<dyn Dispatcher>>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `local://` dispatcher for Function tasks.
    pub fn with_local() -> Self {
        let mut registry = Self::new();
        registry.register(TaskCategory::Function, "local", Arc::new(LocalDispatcher));
        registry
    }

    /// Register `dispatcher` for `category` resources of `scheme`. Use
    /// [`ANY_SCHEME`] to catch every scheme without a dedicated entry.
    pub fn register(
        &mut self,
        category: TaskCategory,
        scheme: impl Into<String>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> &mut Self {
        self.table
            .entry(category)
            .or_default()
            .insert(scheme.into(), dispatcher);
        self
    }

    pub fn resolve(&self, category: TaskCategory, resource: &str) -> Result<Arc<dyn Dispatcher>> {
        let by_scheme = self.table.get(&category).ok_or_else(|| {
            FlowError::Dispatch(format!("no dispatcher registered for category {category}"))
        })?;
        let scheme = resource_scheme(resource).unwrap_or_default();
        by_scheme
            .get(scheme)
            .or_else(|| by_scheme.get(ANY_SCHEME))
            .cloned()
            .ok_or_else(|| {
                FlowError::Dispatch(format!(
                    "no {category} dispatcher for resource '{resource}'"
                ))
            })
    }
}

impl Dispatcher for DispatcherRegistry {
    fn dispatch(
        &self,
        category: TaskCategory,
        info: DispatchInfo,
    ) -> BoxFuture<'_, Result<DispatchResponse>> {
        Box::pin(async move {
            let target = self.resolve(category, &info.resource)?;
            debug!(
                execution_id = %info.execution_id,
                task = %info.task_name,
                resource = %info.resource,
                attempt = info.attempt,
                "dispatching"
            );
            target.dispatch(category, info).await
        })
    }
}
