// src/lock.rs

//! Distributed mutual exclusion on top of [`AtomicStore`].
//!
//! - `lock` spins on set-if-absent-with-expiry, sleeping between tries, and
//!   gives up once the configured lock timeout elapsed.
//! - `unlock` is compare-and-delete, so a holder whose lock already expired
//!   and was re-acquired by someone else cannot release the new holder.
//!
//! There is no fairness among waiters.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LockSection;
use crate::errors::{FlowError, Result};
use crate::store::AtomicStore;

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn AtomicStore>,
    timeout: Duration,
    retry_interval: Duration,
    expire: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn AtomicStore>, settings: &LockSection) -> Self {
        Self {
            store,
            timeout: Duration::from_millis(settings.timeout_ms),
            retry_interval: Duration::from_millis(settings.retry_interval_ms),
            expire: Duration::from_millis(settings.expire_ms),
        }
    }

    /// Block until `name` is held by `acquirer`, or fail with
    /// [`FlowError::LockTimeout`].
    pub async fn lock(&self, name: &str, acquirer: &str, expire: Duration) -> Result<()> {
        let started = Instant::now();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            if self.store.set_if_absent(name, acquirer, expire).await? {
                if attempts > 1 {
                    debug!(lock = %name, attempts, "lock acquired after retries");
                }
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed > self.timeout {
                return Err(FlowError::LockTimeout {
                    name: name.to_string(),
                    attempts,
                    elapsed_ms: elapsed.as_millis(),
                });
            }
            if attempts % 10 == 0 {
                debug!(lock = %name, attempts, "still waiting for lock");
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Release `name` if it is still held by `acquirer`. Returns whether the
    /// lock was released; a stale acquirer is a no-op.
    pub async fn unlock(&self, name: &str, acquirer: &str) -> Result<bool> {
        let released = self.store.compare_and_delete(name, acquirer).await?;
        if !released {
            debug!(lock = %name, acquirer, "unlock skipped, lock not held by acquirer");
        }
        Ok(released)
    }

    /// Run `f` while holding `name` with the configured expiry.
    ///
    /// The lock is released whether `f` succeeds or fails; an unlock error is
    /// logged and the result of `f` is returned.
    pub async fn lock_and_run<F, Fut, T>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let acquirer = Uuid::new_v4().to_string();
        self.lock(name, &acquirer, self.expire).await?;

        let result = f().await;

        if let Err(err) = self.unlock(name, &acquirer).await {
            warn!(lock = %name, error = %err, "failed to release lock");
        }
        result
    }
}
