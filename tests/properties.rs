// tests/properties.rs

mod common;
use crate::common::builders::{DagBuilder, TaskBuilder};
use crate::common::fakes::Scripted;
use crate::common::{Harness, obj};

use std::collections::HashSet;

use proptest::prelude::*;
use serde_json::json;

use flowdag::dag::{Dag, DagSettings, DagStatus, RetryConfig, RetryContext, TaskStatus};
use flowdag::retry::{RetryPolicy, SimpleRetryPolicy};

fn retry_ctx(attempts: u32, max: u32, interval: i64, multiplier: f64) -> RetryContext {
    RetryContext {
        task_name: "t".into(),
        status: TaskStatus::Failed,
        attempts,
        config: RetryConfig {
            max_retry_times: max,
            interval_in_seconds: interval,
            multiplier,
        },
    }
}

// Acyclic by construction: task i may only point at tasks i+1..n.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = (usize, Vec<Vec<usize>>)> {
    (1..=max_tasks).prop_flat_map(|n| {
        (
            Just(n),
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n),
        )
    })
}

fn build_dag(n: usize, raw: &[Vec<usize>]) -> Dag {
    let mut builder = DagBuilder::new("random");
    for (i, targets) in raw.iter().enumerate() {
        let next: HashSet<String> = targets
            .iter()
            .filter(|_| i + 1 < n)
            .map(|t| format!("t{}", i + 1 + t % (n - i - 1)))
            .collect();
        let mut task = TaskBuilder::function(&format!("t{i}"), "local://t");
        if !next.is_empty() {
            let mut next: Vec<String> = next.into_iter().collect();
            next.sort();
            task = task.next(&next.join(","));
        }
        builder = builder.task(task.build());
    }
    builder.build()
}

proptest! {
    #[test]
    fn retry_continues_exactly_while_attempts_within_max(attempts in 1u32..20, max in 0u32..10) {
        let decision = SimpleRetryPolicy.need_retry(&retry_ctx(attempts, max, 1, 2.0));
        prop_assert_eq!(decision, attempts <= max);
    }

    #[test]
    fn backoff_never_shrinks(interval in 0i64..60, multiplier in 1.0f64..4.0, attempts in 1u32..10) {
        let policy = SimpleRetryPolicy;
        let now = policy.retry_interval_seconds(&retry_ctx(attempts, 20, interval, multiplier));
        let later = policy.retry_interval_seconds(&retry_ctx(attempts + 1, 20, interval, multiplier));
        prop_assert!(later >= now);
        if attempts == 1 {
            prop_assert_eq!(now, interval as u64);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_task_runs_once_and_the_execution_settles(
        (n, raw) in dag_strategy(8),
        failing in proptest::option::of(0usize..8),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let h = Harness::new();
            let failing = failing.filter(|f| *f < n);
            if let Some(f) = failing {
                h.dispatcher.script(&format!("t{f}"), vec![Scripted::Fail("boom".into())]);
            }

            let info = h
                .ops
                .submit("e1", build_dag(n, &raw), obj(json!({})), DagSettings::default())
                .await
                .unwrap();

            for i in 0..n {
                let name = format!("t{i}");
                assert!(h.dispatcher.calls_for(&name).len() <= 1, "{name} dispatched twice");
            }
            match failing {
                None => {
                    assert_eq!(info.status, DagStatus::Succeed);
                    assert_eq!(h.dispatcher.calls().len(), n);
                }
                Some(f) => {
                    assert_eq!(info.status, DagStatus::Failed);
                    assert_eq!(info.failed_task.as_deref(), Some(format!("t{f}").as_str()));
                    assert!(info.tasks.values().all(|t| t.status != TaskStatus::Running));
                }
            }
        });
    }
}
