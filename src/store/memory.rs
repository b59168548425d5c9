// src/store/memory.rs

//! In-process implementation of the storage contract.
//!
//! Every primitive runs under one mutex, which gives the same atomicity the
//! server-side scripts give a shared store. Records are JSON encoded so the
//! persisted shape matches what a remote store would hold.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::dag::DagInfo;
use crate::errors::{FlowError, Result};
use crate::store::{AtomicStore, DagStorage};
use crate::types::{BoxFuture, Context};

const DAG_INFO_PREFIX: &str = "dag_info_";
const CONTEXT_PREFIX: &str = "dag_context_";

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: i64, member: &str) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Entry>,
    sorted: HashMap<String, SortedSet>,
}

impl Inner {
    fn get_live(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| !e.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get(key)
    }

    fn put(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.values
            .insert(key.to_string(), Entry { value, expires_at });
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| FlowError::Storage("memory store mutex poisoned".to_string()))
    }

    /// Number of members currently in a sorted set.
    pub fn zcard(&self, key: &str) -> Result<usize> {
        Ok(self
            .state()?
            .sorted
            .get(key)
            .map(|set| set.scores.len())
            .unwrap_or(0))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut state = self.state()?;
        match state.get_live(key) {
            Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.state()?.put(key, encoded, ttl);
        Ok(())
    }
}

impl DagStorage for MemoryStore {
    fn save_dag_info<'a>(
        &'a self,
        info: &'a DagInfo,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let key = format!("{DAG_INFO_PREFIX}{}", info.execution_id);
            self.put_json(&key, info, ttl)
        })
    }

    fn get_dag_info<'a>(&'a self, execution_id: &'a str) -> BoxFuture<'a, Result<Option<DagInfo>>> {
        Box::pin(async move { self.get_json(&format!("{DAG_INFO_PREFIX}{execution_id}")) })
    }

    fn save_context<'a>(
        &'a self,
        execution_id: &'a str,
        context: &'a Context,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.put_json(&format!("{CONTEXT_PREFIX}{execution_id}"), context, ttl)
        })
    }

    fn get_context<'a>(&'a self, execution_id: &'a str) -> BoxFuture<'a, Result<Option<Context>>> {
        Box::pin(async move { self.get_json(&format!("{CONTEXT_PREFIX}{execution_id}")) })
    }

    fn clear<'a>(&'a self, execution_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state()?;
            state.values.remove(&format!("{DAG_INFO_PREFIX}{execution_id}"));
            state.values.remove(&format!("{CONTEXT_PREFIX}{execution_id}"));
            Ok(())
        })
    }
}

impl AtomicStore for MemoryStore {
    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        expire: Duration,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state()?;
            if state.get_live(key).is_some() {
                return Ok(false);
            }
            state.put(key, value.to_string(), Some(expire));
            Ok(true)
        })
    }

    fn compare_and_delete<'a>(&'a self, key: &'a str, expected: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state()?;
            let matches = state.get_live(key).is_some_and(|e| e.value == expected);
            if matches {
                state.values.remove(key);
            }
            Ok(matches)
        })
    }

    fn zadd<'a>(&'a self, key: &'a str, score: i64, member: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state()?
                .sorted
                .entry(key.to_string())
                .or_default()
                .insert(score, member);
            Ok(())
        })
    }

    fn zrem<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            Ok(self
                .state()?
                .sorted
                .get_mut(key)
                .is_some_and(|set| set.remove(member)))
        })
    }

    fn zrange_by_score<'a>(
        &'a self,
        key: &'a str,
        min: i64,
        max: i64,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let state = self.state()?;
            let Some(set) = state.sorted.get(key) else {
                return Ok(Vec::new());
            };
            Ok(set
                .ordered
                .iter()
                .filter(|(score, _)| *score >= min && *score <= max)
                .map(|(_, member)| member.clone())
                .collect())
        })
    }

    fn zpop_due<'a>(&'a self, key: &'a str, max: i64, limit: usize) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let mut state = self.state()?;
            let Some(set) = state.sorted.get_mut(key) else {
                return Ok(Vec::new());
            };
            let due: Vec<(i64, String)> = set
                .ordered
                .iter()
                .take_while(|(score, _)| *score <= max)
                .take(limit)
                .cloned()
                .collect();
            for (_, member) in due.iter() {
                set.remove(member);
            }
            Ok(due.into_iter().map(|(_, member)| member).collect())
        })
    }
}
