// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! Follow-up work produced by a traversal step (a Function dispatch and the
//! `finish` it feeds back) is wrapped into a [`Job`] and handed to an
//! `ExecutorBackend`:
//!
//! - [`InlineBackend`] awaits the job on the caller's task. Deterministic,
//!   used by tests and the default CLI configuration.
//! - [`PooledBackend`] spawns the job onto the tokio runtime; a semaphore
//!   bounds how many jobs run at once. `execute` returns right away.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::types::{BoxFuture, ExecutorMode};

/// Unit of follow-up work. Owns everything it needs.
pub type Job = BoxFuture<'static, ()>;

pub trait ExecutorBackend: Send + Sync {
    /// Run `job`. The returned future resolves once the job is either done
    /// (inline) or handed off (pooled).
    fn execute(&self, job: Job) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineBackend;

impl ExecutorBackend for InlineBackend {
    fn execute(&self, job: Job) -> BoxFuture<'_, ()> {
        job
    }
}

#[derive(Debug, Clone)]
pub struct PooledBackend {
    permits: Arc<Semaphore>,
}

impl PooledBackend {
    pub fn new(pool_size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }
}

impl ExecutorBackend for PooledBackend {
    fn execute(&self, job: Job) -> BoxFuture<'_, ()> {
        let permits = Arc::clone(&self.permits);
        // Acquire inside the spawned task so a job that schedules more jobs
        // never waits on a permit it is holding.
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("executor pool closed, job dropped");
                    return;
                }
            };
            job.await;
        });
        Box::pin(async {})
    }
}

/// Backend for the configured executor mode.
pub fn backend_for(mode: ExecutorMode, pool_size: usize) -> Arc<dyn ExecutorBackend> {
    match mode {
        ExecutorMode::Inline => Arc::new(InlineBackend),
        ExecutorMode::Pooled => Arc::new(PooledBackend::new(pool_size)),
    }
}
