// tests/time_checker.rs

mod common;
use crate::common::fakes::ManualClock;
use crate::common::{init_tracing, with_timeout};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flowdag::checker::{TimeCheckHandler, TimeCheckMember, TimeChecker};
use flowdag::config::CheckerSection;
use flowdag::dag::TaskCategory;
use flowdag::errors::{FlowError, Result};
use flowdag::store::MemoryStore;
use flowdag::types::BoxFuture;

/// Counts deliveries per encoded member.
#[derive(Default)]
struct Collect {
    seen: Mutex<HashMap<TimeCheckMember, usize>>,
}

impl Collect {
    fn total(&self) -> usize {
        self.seen.lock().unwrap().values().sum()
    }

    fn max_deliveries(&self) -> usize {
        self.seen.lock().unwrap().values().copied().max().unwrap_or(0)
    }
}

impl TimeCheckHandler for Collect {
    fn handle(&self, member: TimeCheckMember) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.seen.lock().unwrap().entry(member).or_default() += 1;
            Ok(())
        })
    }
}

/// Fails every delivery; the checker must keep going.
struct Failing;

impl TimeCheckHandler for Failing {
    fn handle(&self, member: TimeCheckMember) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Err(FlowError::illegal(format!("cannot handle {}", member.execution_id))) })
    }
}

fn checker(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>, batch_size: usize) -> TimeChecker {
    let settings = CheckerSection {
        batch_size,
        bucket_count: 8,
        ..Default::default()
    };
    TimeChecker::new(store.clone(), clock.clone(), settings)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pollers_deliver_each_member_once() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let first = Arc::new(checker(&store, &clock, 30));
    let second = Arc::new(checker(&store, &clock, 17));

    for i in 0..10_000 {
        let member = TimeCheckMember::task_timeout(format!("exec-{}", i % 97), TaskCategory::Function, format!("t{i}"));
        first.add_member(&member, 1_000_000 + (i % 50) as i64).await.unwrap();
    }
    clock.advance_secs(1);

    let handler = Arc::new(Collect::default());
    let (a, b) = with_timeout(async {
        tokio::join!(
            first.check_once(handler.as_ref()),
            second.check_once(handler.as_ref())
        )
    })
    .await;

    assert_eq!(a.unwrap() + b.unwrap(), 10_000);
    assert_eq!(handler.total(), 10_000);
    assert_eq!(handler.max_deliveries(), 1);
}

#[tokio::test]
async fn members_not_yet_due_stay_pending() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let checker = checker(&store, &clock, 30);
    let handler = Collect::default();

    checker
        .add_member(&TimeCheckMember::dag_timeout("early"), 1_000_500)
        .await
        .unwrap();
    checker
        .add_member(&TimeCheckMember::dag_timeout("late"), 1_010_000)
        .await
        .unwrap();

    clock.advance_secs(1);
    assert_eq!(checker.check_once(&handler).await.unwrap(), 1);
    assert_eq!(checker.check_once(&handler).await.unwrap(), 0);

    clock.advance_secs(10);
    assert_eq!(checker.check_once(&handler).await.unwrap(), 1);
    assert_eq!(handler.total(), 2);
}

#[tokio::test]
async fn removed_members_are_never_delivered() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let checker = checker(&store, &clock, 30);
    let member = TimeCheckMember::task_wait("e1", TaskCategory::Suspense, "S");

    checker.add_member(&member, 1_000_100).await.unwrap();
    assert!(checker.remove_member(&member).await.unwrap());
    assert!(!checker.remove_member(&member).await.unwrap());

    clock.advance_secs(5);
    assert_eq!(checker.check_once(&Collect::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn re_adding_a_member_reschedules_it() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let checker = checker(&store, &clock, 30);
    let member = TimeCheckMember::dag_timeout("e1");

    checker.add_member(&member, 1_001_000).await.unwrap();
    checker.add_member(&member, 1_005_000).await.unwrap();

    clock.advance_secs(2);
    assert_eq!(checker.check_once(&Collect::default()).await.unwrap(), 0);
    clock.advance_secs(3);
    assert_eq!(checker.check_once(&Collect::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn handler_errors_do_not_requeue_or_stop_the_scan() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let checker = checker(&store, &clock, 2);

    for i in 0..5 {
        checker
            .add_member(&TimeCheckMember::dag_timeout(format!("e{i}")), 1_000_000)
            .await
            .unwrap();
    }
    assert_eq!(checker.check_once(&Failing).await.unwrap(), 5);
    assert_eq!(checker.check_once(&Failing).await.unwrap(), 0);
}
