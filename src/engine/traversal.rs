// src/engine/traversal.rs

//! IO shell around [`TraversalCore`]: every event runs as
//! lock → load → apply → persist → schedule → unlock on the execution's
//! lock. Time check changes are written before the lock is released, so two
//! steps on one execution can never leave their checks in the wrong order.
//! Dispatches and notifications are handed back to the caller, which carries
//! them out after the lock is gone.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::checker::TimeChecker;
use crate::clock::Clock;
use crate::config::EngineSection;
use crate::dag::{Dag, DagInfo, DagSettings};
use crate::dispatch::DispatchInfo;
use crate::engine::{CoreStep, Effect, FlowEvent, Notification, TraversalCore};
use crate::errors::{FlowError, Result};
use crate::lock::DistributedLock;
use crate::store::DagStorage;
use crate::types::Context;

/// Result of one locked step: what is left to do once the lock is gone.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub dispatches: Vec<DispatchInfo>,
    pub notifications: Vec<Notification>,
    pub dag_info: DagInfo,
    pub context: Context,
}

pub fn lock_name(execution_id: &str) -> String {
    format!("lock_dag_{execution_id}")
}

pub struct DagTraversal {
    core: TraversalCore,
    storage: Arc<dyn DagStorage>,
    lock: DistributedLock,
    checker: Arc<TimeChecker>,
    clock: Arc<dyn Clock>,
    settings: EngineSection,
}

impl DagTraversal {
    pub fn new(
        core: TraversalCore,
        storage: Arc<dyn DagStorage>,
        lock: DistributedLock,
        checker: Arc<TimeChecker>,
        clock: Arc<dyn Clock>,
        settings: EngineSection,
    ) -> Self {
        Self {
            core,
            storage,
            lock,
            checker,
            clock,
            settings,
        }
    }

    pub fn storage(&self) -> &Arc<dyn DagStorage> {
        &self.storage
    }

    /// Create the execution record and start its root tasks.
    pub async fn submit(
        &self,
        execution_id: &str,
        mut dag: Dag,
        data: Context,
        settings: DagSettings,
    ) -> Result<StepOutcome> {
        let max = settings.max_depth.unwrap_or(self.settings.max_depth);
        let depth = dag.depth();
        if depth > max {
            return Err(FlowError::DepthExceeded { depth, max });
        }
        let unknown = dag.expand_mapping_references();
        if !unknown.is_empty() {
            return Err(FlowError::Mapping(format!(
                "unknown mapping references: {}",
                unknown.join(", ")
            )));
        }

        self.lock
            .lock_and_run(&lock_name(execution_id), || async {
                if !settings.ignore_exist
                    && self.storage.get_dag_info(execution_id).await?.is_some()
                {
                    return Err(FlowError::illegal(format!(
                        "execution {execution_id} already exists"
                    )));
                }

                let now = self.clock.now_ms();
                let mut info = DagInfo::new(execution_id, dag, settings, now);
                let mut context = Context::new();
                let step = self
                    .core
                    .apply(&mut info, &mut context, FlowEvent::Submit { data }, now)?;
                self.persist(&info, &context).await?;
                info!(execution_id, dag = %info.dag.dag_name, status = ?info.status, "execution submitted");
                Ok(self.schedule(step, info, context).await)
            })
            .await
    }

    /// Apply one event to an existing execution.
    pub async fn step(&self, execution_id: &str, event: FlowEvent) -> Result<StepOutcome> {
        self.lock
            .lock_and_run(&lock_name(execution_id), || async {
                let mut info = self
                    .storage
                    .get_dag_info(execution_id)
                    .await?
                    .ok_or_else(|| FlowError::ExecutionNotFound(execution_id.to_string()))?;
                let mut context = self
                    .storage
                    .get_context(execution_id)
                    .await?
                    .unwrap_or_default();

                let kind = event.kind();
                let now = self.clock.now_ms();
                let step = self.core.apply(&mut info, &mut context, event, now)?;
                self.persist(&info, &context).await?;
                debug!(
                    execution_id,
                    event = kind,
                    status = ?info.status,
                    effects = step.effects.len(),
                    "traversal step applied"
                );
                Ok(self.schedule(step, info, context).await)
            })
            .await
    }

    /// Write the step's time check changes in order and keep the rest for
    /// the caller. A failed write is logged; the step itself is already
    /// persisted.
    async fn schedule(&self, step: CoreStep, dag_info: DagInfo, context: Context) -> StepOutcome {
        let mut dispatches = Vec::new();
        for effect in step.effects {
            match effect {
                Effect::AddTimeCheck { member, due_ms } => {
                    if let Err(err) = self.checker.add_member(&member, due_ms).await {
                        warn!(execution_id = %dag_info.execution_id, error = %err, "failed to add time check");
                    }
                }
                Effect::RemoveTimeCheck(member) => {
                    if let Err(err) = self.checker.remove_member(&member).await {
                        warn!(execution_id = %dag_info.execution_id, error = %err, "failed to remove time check");
                    }
                }
                Effect::Dispatch(info) => dispatches.push(info),
            }
        }
        StepOutcome {
            dispatches,
            notifications: step.notifications,
            dag_info,
            context,
        }
    }

    async fn persist(&self, info: &DagInfo, context: &Context) -> Result<()> {
        let ttl = if info.status.is_terminal() {
            self.settings.finished_ttl_seconds
        } else {
            self.settings.unfinished_ttl_seconds
        };
        let ttl = (ttl > 0).then(|| Duration::from_secs(ttl));
        self.storage.save_dag_info(info, ttl).await?;
        self.storage
            .save_context(&info.execution_id, context, ttl)
            .await
    }
}
