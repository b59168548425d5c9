// tests/containers.rs

mod common;
use crate::common::builders::{DagBuilder, TaskBuilder};
use crate::common::fakes::Scripted;
use crate::common::{Harness, obj};

use serde_json::json;

use flowdag::dag::{BaseTask, CompletionPolicy, Dag, DagSettings, DagStatus, NotifyInfo, TaskStatus};
use flowdag::engine::NORMAL_SKIP_MSG;
use flowdag::runners::choice::NOT_CHOSEN_MSG;
use flowdag::runners::foreach::EMPTY_LOOP_MSG;
use flowdag::runners::group::CONTAINER_DONE_MSG;
use flowdag::runners::return_task::RETURNED_MSG;

fn looped(loop_task: BaseTask) -> Dag {
    DagBuilder::new("loop")
        .task(loop_task)
        .task(TaskBuilder::pass("after").build())
        .build()
}

fn work() -> BaseTask {
    TaskBuilder::function("work", "local://work")
        .input("$.context.n", "$.input.n")
        .output("$.output.n", "$.context.done")
        .build()
}

fn foreach(tasks: Vec<BaseTask>) -> TaskBuilder {
    TaskBuilder::foreach("loop", "$.input.items", "n", tasks)
        .input("$.context.items", "$.input.items")
        .output("$.output.sub_context", "$.context.results")
        .next("after")
}

#[tokio::test]
async fn foreach_runs_one_group_per_item_and_collects_contexts() {
    let h = Harness::new();
    let info = h
        .ops
        .submit(
            "e1",
            looped(foreach(vec![work()]).build()),
            obj(json!({ "items": [1, 2, 3] })),
            DagSettings::default(),
        )
        .await
        .unwrap();

    assert_eq!(info.status, DagStatus::Succeed);
    assert_eq!(info.task_status("loop"), Some(TaskStatus::Succeed));
    for index in 0..3 {
        assert_eq!(
            info.task_status(&format!("loop_{index}-work")),
            Some(TaskStatus::Succeed)
        );
    }

    let context = h.ops.context("e1").await.unwrap();
    let results = context.get("results").and_then(|v| v.as_array()).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[1].get("done"), Some(&json!(2)));
}

#[tokio::test]
async fn long_board_fails_after_every_group_settled() {
    let h = Harness::new();
    h.dispatcher
        .script("loop_1-work", vec![Scripted::Fail("bad item".into())]);

    let info = h
        .ops
        .submit(
            "e1",
            looped(foreach(vec![work()]).build()),
            obj(json!({ "items": [1, 2, 3] })),
            DagSettings::default(),
        )
        .await
        .unwrap();

    assert_eq!(info.task_status("loop_0-work"), Some(TaskStatus::Succeed));
    assert_eq!(info.task_status("loop_2-work"), Some(TaskStatus::Succeed));
    assert_eq!(info.task_status("loop"), Some(TaskStatus::Failed));
    assert_eq!(info.task_status("after"), Some(TaskStatus::NotStarted));
    assert_eq!(info.status, DagStatus::Failed);
    assert!(info.msg.as_deref().unwrap_or_default().contains("bad item"));
}

#[tokio::test]
async fn short_board_succeeds_on_the_first_group() {
    let h = Harness::new();
    h.dispatcher
        .script("loop_0-work", vec![Scripted::Accept])
        .script("loop_2-work", vec![Scripted::Accept]);

    let info = h
        .ops
        .submit(
            "e1",
            looped(
                foreach(vec![work()])
                    .completion(CompletionPolicy::ShortBoard)
                    .build(),
            ),
            obj(json!({ "items": [1, 2, 3] })),
            DagSettings::default(),
        )
        .await
        .unwrap();

    assert_eq!(info.task_status("loop"), Some(TaskStatus::Succeed));
    assert_eq!(info.task_status("after"), Some(TaskStatus::Succeed));
    assert_eq!(info.status, DagStatus::Succeed);
}

#[tokio::test]
async fn key_resource_only_waits_for_key_sub_tasks() {
    let h = Harness::new();
    for index in 0..2 {
        h.dispatcher
            .script(&format!("loop_{index}-tail"), vec![Scripted::Accept]);
    }
    let tasks = vec![
        TaskBuilder::function("key", "local://key").next("tail").build(),
        TaskBuilder::function("tail", "local://tail").build(),
    ];

    let info = h
        .ops
        .submit(
            "e1",
            looped(
                foreach(tasks)
                    .completion(CompletionPolicy::KeyResource {
                        key_tasks: vec!["key".into()],
                    })
                    .build(),
            ),
            obj(json!({ "items": ["a", "b"] })),
            DagSettings::default(),
        )
        .await
        .unwrap();

    assert_eq!(info.task_status("loop_0-tail"), Some(TaskStatus::Running));
    assert_eq!(info.task_status("loop"), Some(TaskStatus::Succeed));
}

#[tokio::test]
async fn max_concurrency_activates_groups_in_order() {
    let h = Harness::new();
    for index in 0..3 {
        h.dispatcher
            .script(&format!("loop_{index}-work"), vec![Scripted::Accept]);
    }

    h.ops
        .submit(
            "e1",
            looped(foreach(vec![work()]).max_concurrency(1).build()),
            obj(json!({ "items": [1, 2, 3] })),
            DagSettings::default(),
        )
        .await
        .unwrap();
    let names = |h: &Harness| -> Vec<String> {
        h.dispatcher.calls().into_iter().map(|c| c.task_name).collect()
    };
    assert_eq!(names(&h), vec!["loop_0-work"]);

    for index in 0..3 {
        h.ops
            .finish(
                "e1",
                obj(json!({ "n": index })),
                NotifyInfo::for_task(format!("loop_{index}-work")).with_attempt(1),
            )
            .await
            .unwrap();
    }
    assert_eq!(names(&h), vec!["loop_0-work", "loop_1-work", "loop_2-work"]);
    assert_eq!(h.ops.dag_info("e1").await.unwrap().status, DagStatus::Succeed);
}

#[tokio::test]
async fn empty_collection_succeeds_immediately() {
    let h = Harness::new();
    let info = h
        .ops
        .submit(
            "e1",
            looped(foreach(vec![work()]).build()),
            obj(json!({ "items": [] })),
            DagSettings::default(),
        )
        .await
        .unwrap();
    let lp = info.find_task("loop").unwrap();
    assert_eq!(lp.status, TaskStatus::Succeed);
    assert_eq!(lp.msg.as_deref(), Some(EMPTY_LOOP_MSG));
    assert_eq!(info.status, DagStatus::Succeed);
}

#[tokio::test]
async fn non_array_collection_fails_the_foreach() {
    let h = Harness::new();
    let info = h
        .ops
        .submit(
            "e1",
            looped(foreach(vec![work()]).build()),
            obj(json!({ "items": "nope" })),
            DagSettings::default(),
        )
        .await
        .unwrap();
    assert_eq!(info.task_status("loop"), Some(TaskStatus::Failed));
    assert_eq!(info.status, DagStatus::Failed);
}

#[tokio::test]
async fn choice_runs_matching_branches_and_skips_the_rest() {
    let h = Harness::new();
    h.dispatcher
        .script("pick_0-gold", vec![Scripted::Complete(obj(json!({ "medal": "gold" })))]);

    let dag = DagBuilder::new("choice")
        .task(
            TaskBuilder::choice(
                "pick",
                vec![
                    (
                        Some("input.kind == 'gold'"),
                        vec![TaskBuilder::function("gold", "local://gold")
                            .output("$.output.medal", "$.context.medal")
                            .build()],
                    ),
                    (
                        Some("input.kind == 'silver'"),
                        vec![TaskBuilder::function("silver", "local://silver").build()],
                    ),
                ],
            )
            .input("$.context.kind", "$.input.kind")
            .output("$.output.medal", "$.context.medal")
            .build(),
        )
        .build();

    let info = h
        .ops
        .submit("e1", dag, obj(json!({ "kind": "gold" })), DagSettings::default())
        .await
        .unwrap();

    assert_eq!(info.status, DagStatus::Succeed);
    assert_eq!(info.task_status("pick_0-gold"), Some(TaskStatus::Succeed));
    let silver = info.find_task("pick_1-silver").unwrap();
    assert_eq!(silver.status, TaskStatus::Skipped);
    assert_eq!(silver.msg.as_deref(), Some(NOT_CHOSEN_MSG));
    assert!(h.dispatcher.calls_for("pick_1-silver").is_empty());

    let context = h.ops.context("e1").await.unwrap();
    assert_eq!(context.get("medal"), Some(&json!("gold")));
}

#[tokio::test]
async fn failed_choice_branch_skips_its_unstarted_siblings() {
    let h = Harness::new();
    h.dispatcher
        .script("pick_0-first", vec![Scripted::Fail("nope".into())]);

    let dag = DagBuilder::new("choice")
        .task(
            TaskBuilder::choice(
                "pick",
                vec![(
                    None,
                    vec![
                        TaskBuilder::function("first", "local://first").next("second").build(),
                        TaskBuilder::function("second", "local://second").build(),
                    ],
                )],
            )
            .build(),
        )
        .build();

    let info = h
        .ops
        .submit("e1", dag, obj(json!({})), DagSettings::default())
        .await
        .unwrap();
    assert_eq!(info.task_status("pick"), Some(TaskStatus::Failed));
    let second = info.find_task("pick_0-second").unwrap();
    assert_eq!(second.status, TaskStatus::Skipped);
    assert_eq!(second.msg.as_deref(), Some(CONTAINER_DONE_MSG));
}

#[tokio::test]
async fn switch_vetoes_unmatched_successors() {
    let h = Harness::new();
    let dag = DagBuilder::new("switch")
        .task(
            TaskBuilder::switch(
                "route",
                &[
                    (Some("input.go == 'left'"), "L"),
                    (Some("input.go == 'right'"), "R"),
                ],
            )
            .input("$.context.go", "$.input.go")
            .next("L,R")
            .build(),
        )
        .task(TaskBuilder::function("L", "local://l").next("J").build())
        .task(TaskBuilder::function("R", "local://r").next("J").build())
        .task(TaskBuilder::pass("J").build())
        .build();

    let info = h
        .ops
        .submit("e1", dag, obj(json!({ "go": "left" })), DagSettings::default())
        .await
        .unwrap();

    assert_eq!(info.task_status("route"), Some(TaskStatus::Succeed));
    assert_eq!(info.task_status("L"), Some(TaskStatus::Succeed));
    let r = info.find_task("R").unwrap();
    assert_eq!(r.status, TaskStatus::Skipped);
    assert_eq!(r.msg.as_deref(), Some(NORMAL_SKIP_MSG));
    assert_eq!(info.task_status("J"), Some(TaskStatus::Succeed));
    assert!(h.dispatcher.calls_for("R").is_empty());
}

fn returning() -> Dag {
    DagBuilder::new("return")
        .task(TaskBuilder::pass("A").next("RET").build())
        .task(
            TaskBuilder::ret("RET", &["$.context.stop"])
                .next("B")
                .build(),
        )
        .task(TaskBuilder::function("B", "local://b").build())
        .task(TaskBuilder::function("other", "local://other").build())
        .build()
}

#[tokio::test]
async fn fired_return_ends_the_execution() {
    let h = Harness::new();
    h.dispatcher.script("other", vec![Scripted::Accept]);

    let info = h
        .ops
        .submit("e1", returning(), obj(json!({ "stop": true })), DagSettings::default())
        .await
        .unwrap();

    let ret = info.find_task("RET").unwrap();
    assert_eq!(ret.status, TaskStatus::Succeed);
    assert_eq!(ret.msg.as_deref(), Some(RETURNED_MSG));
    assert_eq!(info.task_status("B"), Some(TaskStatus::Skipped));
    assert!(info.returned);
    assert_eq!(info.status, DagStatus::Succeed);
    assert!(h.dispatcher.calls_for("B").is_empty());
}

#[tokio::test]
async fn unfired_return_lets_the_flow_continue() {
    let h = Harness::new();
    let info = h
        .ops
        .submit("e1", returning(), obj(json!({ "stop": false })), DagSettings::default())
        .await
        .unwrap();

    assert_eq!(info.task_status("RET"), Some(TaskStatus::Succeed));
    assert_eq!(info.task_status("B"), Some(TaskStatus::Succeed));
    assert!(!info.returned);
    assert_eq!(info.status, DagStatus::Succeed);
}
