// src/types.rs

//! Small shared types used across the engine, store and config layers.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::Deserialize;

/// Per-execution context map. Group sub-contexts live inside it under
/// `__<route>` keys.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Boxed, sendable future returned by the pluggable seams (store, dispatcher,
/// executor backend, time-check handler).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How follow-up work produced by a traversal step (dispatches, finish
/// re-entries) is executed.
///
/// - `Inline`: awaited on the caller's task, one after another.
/// - `Pooled`: spawned onto the tokio runtime, bounded by `pool_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    Inline,
    Pooled,
}

impl Default for ExecutorMode {
    fn default() -> Self {
        ExecutorMode::Inline
    }
}

impl FromStr for ExecutorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Ok(ExecutorMode::Inline),
            "pooled" => Ok(ExecutorMode::Pooled),
            other => Err(format!(
                "invalid executor mode: {other} (expected \"inline\" or \"pooled\")"
            )),
        }
    }
}
