// src/lib.rs

pub mod callback;
pub mod checker;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dag;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod mapping;
pub mod retry;
pub mod runners;
pub mod store;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cli::CliArgs;
use crate::config::load_or_default;
use crate::dag::{BaseTask, Dag, DagSettings, DagStatus};
use crate::engine::FlowOperations;
use crate::types::Context;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the DAG description and initial context
/// - the engine with the built-in `local://` dispatcher
/// - the background time checker
///
/// and prints the final instance and context as JSON on stdout.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)?;

    let raw = std::fs::read_to_string(&args.dag)
        .with_context(|| format!("reading DAG description {}", args.dag))?;
    let dag: Dag = serde_json::from_str(&raw)
        .with_context(|| format!("parsing DAG description {}", args.dag))?;
    let data = parse_input(args.input.as_deref())?;

    if args.dry_run {
        print_dry_run(&dag);
        return Ok(());
    }

    let execution_id = args
        .execution_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(execution_id = %execution_id, dag = %dag.dag_name, "starting execution");

    let ops = FlowOperations::builder(cfg).build();
    let checker = ops.spawn_checker();
    let result = ops
        .run(
            &execution_id,
            dag,
            data,
            DagSettings::default(),
            Duration::from_secs(args.timeout_secs),
        )
        .await;
    checker.shutdown().await;
    let result = result?;

    let report = serde_json::json!({
        "execution_id": execution_id,
        "status": result.dag_info.status,
        "msg": result.dag_info.msg,
        "failed_task": result.dag_info.failed_task,
        "context": result.context,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if result.dag_info.status == DagStatus::Failed {
        bail!(
            "execution {execution_id} failed: {}",
            result.dag_info.msg.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

fn parse_input(input: Option<&str>) -> Result<Context> {
    let Some(raw) = input else {
        return Ok(Context::new());
    };
    match serde_json::from_str(raw).context("parsing --input")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("--input must be a JSON object, got {other}"),
    }
}

/// Simple dry-run output: the task tree with categories and edges.
fn print_dry_run(dag: &Dag) {
    println!("flowdag dry-run");
    println!("  workspace = {}", dag.workspace);
    println!("  dag_name = {}", dag.dag_name);
    println!("  depth = {}", dag.depth());
    if !dag.key_tasks.is_empty() {
        println!("  key_tasks = {:?}", dag.key_tasks);
    }
    println!();

    println!("tasks ({}):", dag.tasks.len());
    for task in &dag.tasks {
        print_task(task, 1);
    }

    debug!("dry-run complete (no execution)");
}

fn print_task(task: &BaseTask, level: usize) {
    let indent = "  ".repeat(level);
    println!("{indent}- {} [{}]", task.name, task.category());
    if let Some(next) = &task.next {
        println!("{indent}    next: {next}");
    }
    if let Some(timeline) = &task.timeline {
        println!("{indent}    timeline: {timeline:?}");
    }
    for list in task.sub_task_lists() {
        for sub in list {
            print_task(sub, level + 2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_must_be_an_object() {
        assert!(parse_input(None).unwrap().is_empty());
        assert_eq!(parse_input(Some(r#"{"a":1}"#)).unwrap().len(), 1);
        assert!(parse_input(Some("[1,2]")).is_err());
    }
}
