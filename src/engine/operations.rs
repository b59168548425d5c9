// src/engine/operations.rs

//! Public facade.
//!
//! Every operation runs one locked traversal step through [`DagTraversal`]
//! (which also writes the step's time checks) and then, with the lock
//! released, carries out what the step left over:
//!
//! 1. callback notifications fire in order,
//! 2. `run` waiters are resolved when the execution ended,
//! 3. Function dispatches are handed to the executor backend. A completed
//!    dispatch feeds back as `finish`, which is a new step of its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::callback::{CallbackEvent, DagCallback, LoggingCallback};
use crate::checker::{CheckerHandle, TimeChecker};
use crate::clock::{Clock, SystemClock};
use crate::config::FlowConfig;
use crate::dag::{Dag, DagInfo, DagSettings, NotifyInfo, TaskStatus};
use crate::dispatch::{DispatchInfo, DispatchResponse, Dispatcher, DispatcherRegistry};
use crate::engine::result::ResultWaiters;
use crate::engine::{FlowEvent, StepOutcome};
use crate::engine::{DagTraversal, TraversalCore};
use crate::errors::{FlowError, Result};
use crate::exec::{ExecutorBackend, Job, backend_for};
use crate::lock::DistributedLock;
use crate::mapping::{Mapper, PathMapper};
use crate::retry::{RetryPolicy, SimpleRetryPolicy};
use crate::runners::RunnerRegistry;
use crate::store::{AtomicStore, DagStorage, MemoryStore};
use crate::types::{BoxFuture, Context};

pub use crate::engine::result::RunResult;

struct Inner {
    traversal: DagTraversal,
    checker: Arc<TimeChecker>,
    dispatcher: Arc<dyn Dispatcher>,
    executor: Arc<dyn ExecutorBackend>,
    callback: Arc<dyn DagCallback>,
    results: ResultWaiters,
}

/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct FlowOperations {
    inner: Arc<Inner>,
}

impl FlowOperations {
    pub fn builder(config: FlowConfig) -> FlowOperationsBuilder {
        FlowOperationsBuilder::new(config)
    }

    /// Create execution `execution_id` and start it. Returns the instance
    /// as stored once the submit step and its inline follow-ups are done.
    pub async fn submit(
        &self,
        execution_id: &str,
        dag: Dag,
        data: Context,
        settings: DagSettings,
    ) -> Result<DagInfo> {
        let outcome = self
            .inner
            .traversal
            .submit(execution_id, dag, data, settings)
            .await?;
        self.settle(outcome).await
    }

    /// Report the result of a Function attempt.
    pub async fn finish(&self, execution_id: &str, data: Context, notify: NotifyInfo) -> Result<DagInfo> {
        self.handle_event(execution_id.to_string(), FlowEvent::Finish { notify, data })
            .await
    }

    /// Wake a Suspense task (or a task held by a timeline wait).
    pub async fn wakeup(&self, execution_id: &str, data: Context, notify: NotifyInfo) -> Result<DagInfo> {
        self.handle_event(execution_id.to_string(), FlowEvent::Wakeup { notify, data })
            .await
    }

    /// Re-run the named tasks, or every FAILED task when `notify` names
    /// none, together with everything downstream of them.
    pub async fn redo(&self, execution_id: &str, data: Context, notify: NotifyInfo) -> Result<DagInfo> {
        self.handle_event(execution_id.to_string(), FlowEvent::Redo { notify, data })
            .await
    }

    /// Submit and wait until the execution ends or `timeout` elapses.
    pub async fn run(
        &self,
        execution_id: &str,
        dag: Dag,
        data: Context,
        settings: DagSettings,
        timeout: Duration,
    ) -> Result<RunResult> {
        let waiter = self.inner.results.register(execution_id).await?;
        if let Err(err) = self.submit(execution_id, dag, data, settings).await {
            self.inner.results.forget(execution_id).await;
            return Err(err);
        }

        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(FlowError::illegal(format!(
                "waiter for execution {execution_id} was dropped"
            ))),
            Err(_) => {
                self.inner.results.forget(execution_id).await;
                Err(FlowError::RunTimeout(execution_id.to_string()))
            }
        }
    }

    pub async fn dag_info(&self, execution_id: &str) -> Result<DagInfo> {
        self.inner
            .traversal
            .storage()
            .get_dag_info(execution_id)
            .await?
            .ok_or_else(|| FlowError::ExecutionNotFound(execution_id.to_string()))
    }

    pub async fn context(&self, execution_id: &str) -> Result<Context> {
        self.inner
            .traversal
            .storage()
            .get_context(execution_id)
            .await?
            .ok_or_else(|| FlowError::ExecutionNotFound(execution_id.to_string()))
    }

    pub fn checker(&self) -> &Arc<TimeChecker> {
        &self.inner.checker
    }

    /// Start polling the time checker in the background, feeding fired
    /// members back into this engine.
    pub fn spawn_checker(&self) -> CheckerHandle {
        Arc::clone(&self.inner.checker).spawn(Arc::new(self.clone()))
    }

    pub(crate) fn handle_event(
        &self,
        execution_id: String,
        event: FlowEvent,
    ) -> BoxFuture<'_, Result<DagInfo>> {
        Box::pin(async move {
            let outcome = self.inner.traversal.step(&execution_id, event).await?;
            self.settle(outcome).await
        })
    }

    /// Carry out a step and return the freshest stored instance.
    async fn settle(&self, outcome: StepOutcome) -> Result<DagInfo> {
        let execution_id = outcome.dag_info.execution_id.clone();
        let stepped = self.apply_effects(outcome).await;
        match self.inner.traversal.storage().get_dag_info(&execution_id).await? {
            Some(info) => Ok(info),
            None => Ok(stepped),
        }
    }

    async fn apply_effects(&self, outcome: StepOutcome) -> DagInfo {
        let StepOutcome {
            dispatches,
            notifications,
            dag_info,
            context,
        } = outcome;
        let execution_id = dag_info.execution_id.clone();

        let mut ended = false;
        for notification in notifications {
            ended |= notification.event.is_dag_terminal();
            self.inner.callback.on_event(&CallbackEvent {
                execution_id: execution_id.clone(),
                event: notification.event,
                dag_info: dag_info.clone(),
                context: context.clone(),
                task: notification.task,
            });
        }
        if ended {
            self.inner
                .results
                .resolve(
                    &execution_id,
                    RunResult {
                        dag_info: dag_info.clone(),
                        context,
                    },
                )
                .await;
        }

        for info in dispatches {
            self.inner.executor.execute(self.dispatch_job(info)).await;
        }
        dag_info
    }

    /// Dispatch one attempt and feed its answer back as `finish`.
    fn dispatch_job(&self, info: DispatchInfo) -> Job {
        let ops = self.clone();
        Box::pin(async move {
            let execution_id = info.execution_id.clone();
            let task = info.task_name.clone();
            let attempt = info.attempt;

            let (notify, data) = match ops.inner.dispatcher.dispatch(info.category, info).await {
                Ok(DispatchResponse::Completed { output }) => {
                    (NotifyInfo::for_task(&task).with_attempt(attempt), output)
                }
                Ok(DispatchResponse::Accepted) => {
                    debug!(execution_id = %execution_id, task = %task, attempt, "dispatch accepted, awaiting finish");
                    return;
                }
                Err(err) => (
                    NotifyInfo::for_task(&task)
                        .with_attempt(attempt)
                        .with_status(TaskStatus::Failed)
                        .with_msg(err.to_string()),
                    Context::new(),
                ),
            };

            if let Err(err) = ops
                .handle_event(execution_id.clone(), FlowEvent::Finish { notify, data })
                .await
            {
                warn!(execution_id = %execution_id, task = %task, attempt, error = %err, "finish after dispatch failed");
            }
        })
    }
}

/// Wires the engine together; anything not set falls back to the
/// in-process default.
pub struct FlowOperationsBuilder {
    config: FlowConfig,
    storage: Option<Arc<dyn DagStorage>>,
    atomic_store: Option<Arc<dyn AtomicStore>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    callback: Option<Arc<dyn DagCallback>>,
    clock: Option<Arc<dyn Clock>>,
    mapper: Option<Arc<dyn Mapper>>,
    retry: Option<Arc<dyn RetryPolicy>>,
    executor: Option<Arc<dyn ExecutorBackend>>,
    runners: Option<RunnerRegistry>,
}

impl FlowOperationsBuilder {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            storage: None,
            atomic_store: None,
            dispatcher: None,
            callback: None,
            clock: None,
            mapper: None,
            retry: None,
            executor: None,
            runners: None,
        }
    }

    /// Use one in-memory store for records, locks and time checks.
    pub fn memory_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.storage = Some(store.clone());
        self.atomic_store = Some(store);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn DagStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn atomic_store(mut self, store: Arc<dyn AtomicStore>) -> Self {
        self.atomic_store = Some(store);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn callback(mut self, callback: Arc<dyn DagCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ExecutorBackend>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn runners(mut self, runners: RunnerRegistry) -> Self {
        self.runners = Some(runners);
        self
    }

    pub fn build(self) -> FlowOperations {
        let FlowConfig {
            lock,
            checker,
            engine,
        } = self.config;

        let fallback = Arc::new(MemoryStore::new());
        let storage = self
            .storage
            .unwrap_or_else(|| fallback.clone() as Arc<dyn DagStorage>);
        let atomic_store = self.atomic_store.unwrap_or(fallback);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let core = TraversalCore::new(
            self.runners.unwrap_or_else(RunnerRegistry::builtin),
            self.mapper.unwrap_or_else(|| Arc::new(PathMapper)),
            self.retry.unwrap_or_else(|| Arc::new(SimpleRetryPolicy)),
            engine.record_invoke_io,
        );
        let executor = self
            .executor
            .unwrap_or_else(|| backend_for(engine.executor, engine.pool_size));
        let checker = Arc::new(TimeChecker::new(atomic_store.clone(), clock.clone(), checker));
        let traversal = DagTraversal::new(
            core,
            storage,
            DistributedLock::new(atomic_store, &lock),
            checker.clone(),
            clock,
            engine,
        );

        FlowOperations {
            inner: Arc::new(Inner {
                traversal,
                checker,
                dispatcher: self
                    .dispatcher
                    .unwrap_or_else(|| Arc::new(DispatcherRegistry::with_local())),
                executor,
                callback: self.callback.unwrap_or_else(|| Arc::new(LoggingCallback)),
                results: ResultWaiters::new(),
            }),
        }
    }
}
