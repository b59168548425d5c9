// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An event addressed a task or execution in a state it cannot accept.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Task not found: {task} (execution {execution_id})")]
    TaskNotFound { execution_id: String, task: String },

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("DAG nesting depth {depth} exceeds maximum {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("try {attempts} times lock {name} timeout after {elapsed_ms}ms")]
    LockTimeout {
        name: String,
        attempts: u64,
        elapsed_ms: u128,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Run timed out waiting for execution {0}")]
    RunTimeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    /// Convenience constructor for [`FlowError::IllegalState`].
    pub fn illegal(msg: impl Into<String>) -> Self {
        FlowError::IllegalState(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;
