// src/exec/mod.rs

//! Execution of follow-up work.
//!
//! - [`backend`] provides the `ExecutorBackend` trait with an inline and a
//!   pooled implementation, selected by `[engine].executor`.

pub mod backend;

pub use backend::{ExecutorBackend, InlineBackend, Job, PooledBackend, backend_for};
