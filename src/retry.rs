// src/retry.rs

//! Retry policy seam.
//!
//! The engine only talks to [`RetryPolicy`]; [`SimpleRetryPolicy`] is the
//! default exponential-backoff implementation.

use crate::dag::{RetryContext, TaskStatus};

pub trait RetryPolicy: Send + Sync {
    /// Whether the failed attempt described by `context` should be retried.
    fn need_retry(&self, context: &RetryContext) -> bool;

    /// Seconds to wait before the next attempt.
    fn retry_interval_seconds(&self, context: &RetryContext) -> u64;
}

/// `interval × multiplier^retries_so_far`, capped by `max_retry_times`.
///
/// `attempts` counts started attempts, so the first retry waits
/// `interval × multiplier^0`, the second `interval × multiplier^1`, and so on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleRetryPolicy;

impl RetryPolicy for SimpleRetryPolicy {
    fn need_retry(&self, context: &RetryContext) -> bool {
        context.status == TaskStatus::Failed && context.attempts <= context.config.max_retry_times
    }

    fn retry_interval_seconds(&self, context: &RetryContext) -> u64 {
        let interval = context.config.interval_in_seconds.max(0) as f64;
        let multiplier = if context.config.multiplier > 0.0 {
            context.config.multiplier
        } else {
            1.0
        };
        let retries_so_far = context.attempts.saturating_sub(1) as i32;
        let seconds = (interval * multiplier.powi(retries_so_far)).floor();
        if seconds.is_finite() && seconds > 0.0 {
            seconds.min(u64::MAX as f64) as u64
        } else {
            0
        }
    }
}
