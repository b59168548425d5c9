// tests/suspense_wake.rs

mod common;
use crate::common::builders::{DagBuilder, TaskBuilder};
use crate::common::{Harness, obj};

use serde_json::json;

use flowdag::dag::{DagSettings, DagStatus, NotifyInfo, PendingWait, TaskStatus};
use flowdag::errors::FlowError;
use flowdag::runners::suspense::INTERRUPTED_MSG;

#[tokio::test]
async fn wakeup_with_matching_data_resumes_the_flow() {
    let h = Harness::new();
    let dag = DagBuilder::new("approval")
        .task(
            TaskBuilder::suspense("S", &["output.approved"])
                .output("output.approved", "$.context.approved")
                .next("B")
                .build(),
        )
        .task(TaskBuilder::pass("B").build())
        .build();

    let info = h
        .ops
        .submit("e1", dag, obj(json!({})), DagSettings::default())
        .await
        .unwrap();
    assert_eq!(info.task_status("S"), Some(TaskStatus::Suspended));
    assert_eq!(info.status, DagStatus::Running);

    // Conditions not met: S stays unfinished.
    let info = h
        .ops
        .wakeup("e1", obj(json!({ "approved": false })), NotifyInfo::for_task("S"))
        .await
        .unwrap();
    assert_eq!(info.task_status("S"), Some(TaskStatus::Running));
    assert_eq!(info.task_status("B"), Some(TaskStatus::NotStarted));

    let info = h
        .ops
        .wakeup("e1", obj(json!({ "approved": true })), NotifyInfo::for_task("S"))
        .await
        .unwrap();
    assert_eq!(info.task_status("S"), Some(TaskStatus::Succeed));
    assert_eq!(info.status, DagStatus::Succeed);
    let context = h.ops.context("e1").await.unwrap();
    assert_eq!(context.get("approved"), Some(&json!(true)));
}

#[tokio::test]
async fn timeline_interval_wakes_the_task() {
    let h = Harness::new();
    let dag = DagBuilder::new("timer")
        .task(TaskBuilder::suspense("S", &[]).wait_interval(5).build())
        .build();

    let info = h
        .ops
        .submit("e1", dag, obj(json!({})), DagSettings::default())
        .await
        .unwrap();
    let s = info.find_task("S").unwrap();
    assert_eq!(s.status, TaskStatus::Suspended);
    assert_eq!(s.pending_wait, Some(PendingWait::Delay));

    assert_eq!(h.tick(4).await, 0);
    assert_eq!(h.tick(1).await, 1);

    let info = h.ops.dag_info("e1").await.unwrap();
    assert_eq!(info.task_status("S"), Some(TaskStatus::Succeed));
    assert_eq!(info.status, DagStatus::Succeed);
}

#[tokio::test]
async fn interruption_fails_the_task() {
    let h = Harness::new();
    let dag = DagBuilder::new("interrupt")
        .task(
            TaskBuilder::suspense("S", &["output.approved"])
                .interruptions(&["output.cancel"])
                .build(),
        )
        .build();
    h.ops
        .submit("e1", dag, obj(json!({})), DagSettings::default())
        .await
        .unwrap();

    let info = h
        .ops
        .wakeup("e1", obj(json!({ "cancel": true })), NotifyInfo::for_task("S"))
        .await
        .unwrap();
    let s = info.find_task("S").unwrap();
    assert_eq!(s.status, TaskStatus::Failed);
    assert_eq!(s.msg.as_deref(), Some(INTERRUPTED_MSG));
    assert_eq!(info.status, DagStatus::Failed);
}

#[tokio::test]
async fn wakeup_status_finishes_the_task_directly() {
    let h = Harness::new();
    let dag = DagBuilder::new("manual")
        .task(TaskBuilder::suspense("S", &["output.never"]).build())
        .build();
    h.ops
        .submit("e1", dag, obj(json!({})), DagSettings::default())
        .await
        .unwrap();

    let info = h
        .ops
        .wakeup(
            "e1",
            obj(json!({})),
            NotifyInfo::for_task("S").with_status(TaskStatus::Succeed),
        )
        .await
        .unwrap();
    assert_eq!(info.status, DagStatus::Succeed);
}

#[tokio::test]
async fn delayed_task_starts_after_its_wait() {
    let h = Harness::new();
    let dag = DagBuilder::new("delay")
        .task(TaskBuilder::function("A", "local://a").wait_interval(3).build())
        .build();

    let info = h
        .ops
        .submit("e1", dag, obj(json!({})), DagSettings::default())
        .await
        .unwrap();
    assert_eq!(info.task_status("A"), Some(TaskStatus::Suspended));
    assert!(h.dispatcher.calls().is_empty());

    assert_eq!(h.tick(3).await, 1);
    assert_eq!(h.dispatcher.calls_for("A").len(), 1);
    let info = h.ops.dag_info("e1").await.unwrap();
    assert_eq!(info.status, DagStatus::Succeed);
}

#[tokio::test]
async fn wakeup_of_a_finished_task_is_illegal() {
    let h = Harness::new();
    let dag = DagBuilder::new("done")
        .task(TaskBuilder::pass("P").build())
        .task(TaskBuilder::suspense("S", &["$.output.go"]).build())
        .build();
    h.ops
        .submit("e1", dag, obj(json!({})), DagSettings::default())
        .await
        .unwrap();

    let err = h
        .ops
        .wakeup("e1", obj(json!({})), NotifyInfo::for_task("P"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::IllegalState(_)));
}
