// src/store/mod.rs

//! Storage contract.
//!
//! The engine needs two things from the outside store:
//! - [`DagStorage`]: one record per execution (DagInfo + context) with an
//!   optional expiry.
//! - [`AtomicStore`]: the server-side atomic primitives the lock and the time
//!   checker are built on. A Redis-backed implementation would map them to
//!   scripts; [`MemoryStore`] maps them to a single mutex.
//!
//! Both traits return boxed futures so implementations can be swapped behind
//! `Arc<dyn ...>`.

pub mod memory;

use std::time::Duration;

use crate::dag::DagInfo;
use crate::errors::Result;
use crate::types::{BoxFuture, Context};

pub use memory::MemoryStore;

pub trait DagStorage: Send + Sync {
    fn save_dag_info<'a>(
        &'a self,
        info: &'a DagInfo,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>>;

    fn get_dag_info<'a>(&'a self, execution_id: &'a str) -> BoxFuture<'a, Result<Option<DagInfo>>>;

    fn save_context<'a>(
        &'a self,
        execution_id: &'a str,
        context: &'a Context,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>>;

    fn get_context<'a>(&'a self, execution_id: &'a str) -> BoxFuture<'a, Result<Option<Context>>>;

    /// Remove both records of an execution.
    fn clear<'a>(&'a self, execution_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

pub trait AtomicStore: Send + Sync {
    /// Set `key` to `value` with an expiry, only if absent. Returns whether
    /// the value was written.
    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        expire: Duration,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Delete `key` only if it still holds `expected`. Returns whether it was
    /// deleted.
    fn compare_and_delete<'a>(&'a self, key: &'a str, expected: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Add or re-score a sorted-set member.
    fn zadd<'a>(&'a self, key: &'a str, score: i64, member: &'a str) -> BoxFuture<'a, Result<()>>;

    fn zrem<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Members scored within `[min, max]`, lowest score first.
    fn zrange_by_score<'a>(
        &'a self,
        key: &'a str,
        min: i64,
        max: i64,
    ) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Atomically read and remove up to `limit` members scored `<= max`,
    /// lowest score first. A member is returned to exactly one caller.
    fn zpop_due<'a>(&'a self, key: &'a str, max: i64, limit: usize) -> BoxFuture<'a, Result<Vec<String>>>;
}
