// tests/redo.rs

mod common;
use crate::common::builders::{DagBuilder, TaskBuilder};
use crate::common::fakes::Scripted;
use crate::common::{Harness, obj};

use serde_json::json;

use flowdag::dag::{Dag, DagEvent, DagSettings, DagStatus, NotifyInfo, TaskStatus};
use flowdag::errors::FlowError;

fn chain() -> Dag {
    DagBuilder::new("chain")
        .task(TaskBuilder::function("A", "local://a").next("B").build())
        .task(TaskBuilder::function("B", "local://b").next("C").build())
        .task(TaskBuilder::function("C", "local://c").build())
        .build()
}

#[tokio::test]
async fn redo_reruns_failed_tasks_and_their_successors() {
    let h = Harness::new();
    h.dispatcher.script("B", vec![Scripted::Fail("broken".into())]);

    let info = h
        .ops
        .submit("e1", chain(), obj(json!({})), DagSettings::default())
        .await
        .unwrap();
    assert_eq!(info.status, DagStatus::Failed);
    assert_eq!(info.task_status("C"), Some(TaskStatus::NotStarted));

    let info = h
        .ops
        .redo("e1", obj(json!({ "fixed": true })), NotifyInfo::default())
        .await
        .unwrap();

    assert_eq!(info.status, DagStatus::Succeed);
    assert!(info.failed_task.is_none());
    assert_eq!(h.dispatcher.calls_for("A").len(), 1);
    assert_eq!(h.dispatcher.calls_for("B").len(), 2);
    assert_eq!(h.dispatcher.calls_for("C").len(), 1);
    assert_eq!(h.callback.count(DagEvent::DagFailed), 1);
    assert_eq!(h.callback.count(DagEvent::DagSucceed), 1);

    let context = h.ops.context("e1").await.unwrap();
    assert_eq!(context.get("fixed"), Some(&json!(true)));
}

#[tokio::test]
async fn named_redo_reruns_a_succeeded_task() {
    let h = Harness::new();
    h.ops
        .submit("e1", chain(), obj(json!({})), DagSettings::default())
        .await
        .unwrap();

    let info = h
        .ops
        .redo("e1", obj(json!({})), NotifyInfo::for_tasks(["B"]))
        .await
        .unwrap();

    assert_eq!(info.status, DagStatus::Succeed);
    assert_eq!(h.dispatcher.calls_for("A").len(), 1);
    assert_eq!(h.dispatcher.calls_for("B").len(), 2);
    assert_eq!(h.dispatcher.calls_for("C").len(), 2);
}

#[tokio::test]
async fn redo_of_an_unknown_task_is_rejected() {
    let h = Harness::new();
    h.ops
        .submit("e1", chain(), obj(json!({})), DagSettings::default())
        .await
        .unwrap();

    let err = h
        .ops
        .redo("e1", obj(json!({})), NotifyInfo::for_tasks(["nope"]))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::TaskNotFound { .. }));
}

#[tokio::test]
async fn redo_without_failures_is_illegal() {
    let h = Harness::new();
    h.ops
        .submit("e1", chain(), obj(json!({})), DagSettings::default())
        .await
        .unwrap();

    let err = h
        .ops
        .redo("e1", obj(json!({})), NotifyInfo::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::IllegalState(_)));
}

#[tokio::test]
async fn redo_of_a_loop_member_reopens_the_loop() {
    let h = Harness::new();
    h.dispatcher
        .script("loop_1-work", vec![Scripted::Fail("bad item".into())]);

    let dag = DagBuilder::new("loop")
        .task(
            TaskBuilder::foreach(
                "loop",
                "$.input.items",
                "n",
                vec![TaskBuilder::function("work", "local://work").build()],
            )
            .input("$.context.items", "$.input.items")
            .next("after")
            .build(),
        )
        .task(TaskBuilder::pass("after").build())
        .build();

    let info = h
        .ops
        .submit("e1", dag, obj(json!({ "items": [1, 2] })), DagSettings::default())
        .await
        .unwrap();
    assert_eq!(info.task_status("loop"), Some(TaskStatus::Failed));

    let info = h
        .ops
        .redo("e1", obj(json!({})), NotifyInfo::for_tasks(["loop_1-work"]))
        .await
        .unwrap();

    assert_eq!(info.task_status("loop_1-work"), Some(TaskStatus::Succeed));
    assert_eq!(info.task_status("loop"), Some(TaskStatus::Succeed));
    assert_eq!(info.task_status("after"), Some(TaskStatus::Succeed));
    assert_eq!(info.status, DagStatus::Succeed);
    // The healthy member was not re-dispatched.
    assert_eq!(h.dispatcher.calls_for("loop_0-work").len(), 1);
}
