// src/engine/result.rs

//! Waiters for synchronous `run`: a oneshot per execution, resolved when
//! the step that ends the execution is carried out.

use std::collections::HashMap;

use tokio::sync::{Mutex, oneshot};

use crate::dag::DagInfo;
use crate::errors::{FlowError, Result};
use crate::types::Context;

/// Final state handed to a `run` caller.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub dag_info: DagInfo,
    pub context: Context,
}

#[derive(Default)]
pub struct ResultWaiters {
    waiters: Mutex<HashMap<String, oneshot::Sender<RunResult>>>,
}

impl ResultWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the end of `execution_id`. Only one caller may
    /// wait on an execution at a time.
    pub async fn register(&self, execution_id: &str) -> Result<oneshot::Receiver<RunResult>> {
        let mut waiters = self.waiters.lock().await;
        if waiters.get(execution_id).is_some_and(|tx| !tx.is_closed()) {
            return Err(FlowError::illegal(format!(
                "execution {execution_id} already has a run waiting on it"
            )));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(execution_id.to_string(), tx);
        Ok(rx)
    }

    pub async fn resolve(&self, execution_id: &str, result: RunResult) {
        if let Some(tx) = self.waiters.lock().await.remove(execution_id) {
            // The caller may have given up already.
            let _ = tx.send(result);
        }
    }

    pub async fn forget(&self, execution_id: &str) {
        self.waiters.lock().await.remove(execution_id);
    }
}
