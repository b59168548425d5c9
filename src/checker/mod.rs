// src/checker/mod.rs

//! Time / suspense checker.
//!
//! Pending waits (task timeouts, DAG timeouts, retry backoffs, suspense
//! wakes) are sorted-set members scored by their due time in epoch millis.
//! Executions are spread over `bucket_count` bucket sets by a blake3 hash of
//! the execution id, and every touched bucket is recorded in a meta set
//! scored by last-touch time.
//!
//! A poll cycle lists the buckets from the meta set and drains each one with
//! the store's atomic read-and-remove, `batch_size` members at a time, until
//! nothing due is left. Because the pop is atomic, several pollers can run
//! against the same store and each member still reaches exactly one handler.
//! Handler errors are logged per member and never stop the scan; a failed
//! member is not requeued.

pub mod member;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CheckerSection;
use crate::errors::Result;
use crate::store::AtomicStore;
use crate::types::BoxFuture;

pub use member::{CheckMemberType, TimeCheckMember};

/// Meta sorted set listing bucket keys.
pub const META_KEY: &str = "all_time_check_keys";
/// Prefix of bucket sorted sets.
pub const BUCKET_PREFIX: &str = "time_check_";

/// Receives members whose due time passed.
pub trait TimeCheckHandler: Send + Sync {
    fn handle(&self, member: TimeCheckMember) -> BoxFuture<'_, Result<()>>;
}

pub struct TimeChecker {
    store: Arc<dyn AtomicStore>,
    clock: Arc<dyn Clock>,
    settings: CheckerSection,
}

impl TimeChecker {
    pub fn new(store: Arc<dyn AtomicStore>, clock: Arc<dyn Clock>, settings: CheckerSection) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Bucket holding the waits of `execution_id`.
    pub fn bucket_key(&self, execution_id: &str) -> String {
        let hash = blake3::hash(execution_id.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        let shard = u64::from_le_bytes(prefix) % self.settings.bucket_count.max(1);
        format!("{BUCKET_PREFIX}{shard}")
    }

    /// Register (or re-schedule) a wait due at `due_ms`.
    pub async fn add_member(&self, member: &TimeCheckMember, due_ms: i64) -> Result<()> {
        let bucket = self.bucket_key(&member.execution_id);
        let encoded = member.encode()?;
        self.store.zadd(&bucket, due_ms, &encoded).await?;
        self.store
            .zadd(META_KEY, self.clock.now_ms(), &bucket)
            .await?;
        debug!(
            execution_id = %member.execution_id,
            kind = ?member.check_member_type,
            task = ?member.task_info_name,
            due_ms,
            "time check member added"
        );
        Ok(())
    }

    /// Drop a pending wait. Returns whether it was still pending.
    pub async fn remove_member(&self, member: &TimeCheckMember) -> Result<bool> {
        let bucket = self.bucket_key(&member.execution_id);
        let encoded = member.encode()?;
        self.store.zrem(&bucket, &encoded).await
    }

    /// Run one poll cycle and return how many members were delivered.
    pub async fn check_once(&self, handler: &dyn TimeCheckHandler) -> Result<usize> {
        let now = self.clock.now_ms();
        let buckets = self.store.zrange_by_score(META_KEY, i64::MIN, now).await?;
        let mut delivered = 0usize;

        for bucket in buckets {
            loop {
                let batch = self
                    .store
                    .zpop_due(&bucket, now, self.settings.batch_size)
                    .await?;
                if batch.is_empty() {
                    break;
                }
                for raw in batch {
                    delivered += 1;
                    let member = match TimeCheckMember::decode(&raw) {
                        Ok(member) => member,
                        Err(err) => {
                            warn!(bucket = %bucket, member = %raw, error = %err, "undecodable time check member dropped");
                            continue;
                        }
                    };
                    let execution_id = member.execution_id.clone();
                    if let Err(err) = handler.handle(member).await {
                        warn!(execution_id = %execution_id, error = %err, "time check handler failed");
                    }
                }
            }
        }

        if delivered > 0 {
            debug!(delivered, "time check cycle finished");
        }
        Ok(delivered)
    }

    /// Poll every `period_ms` on a background task until the handle is shut
    /// down.
    pub fn spawn(self: Arc<Self>, handler: Arc<dyn TimeCheckHandler>) -> CheckerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = Duration::from_millis(self.settings.period_ms);

        let join = tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "time checker started");
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("time checker stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.check_once(handler.as_ref()).await {
                            warn!(error = %err, "time check cycle aborted");
                        }
                    }
                }
            }
        });

        CheckerHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}

/// Handle of a spawned poller.
pub struct CheckerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl CheckerHandle {
    /// Stop polling and wait for the current cycle to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(err) = self.join.await {
            warn!(error = %err, "time checker task ended abnormally");
        }
    }
}
