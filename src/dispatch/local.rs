// src/dispatch/local.rs

//! Built-in in-process dispatcher for `local://` resources.
//!
//! - `local://echo` completes with the input as output.
//! - `local://fail` always errors.
//! - `local://accept` only accepts; the result must come through `finish`.

use crate::dag::TaskCategory;
use crate::dispatch::{DispatchInfo, DispatchResponse, Dispatcher};
use crate::errors::{FlowError, Result};
use crate::types::BoxFuture;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDispatcher;

impl Dispatcher for LocalDispatcher {
    fn dispatch(
        &self,
        _category: TaskCategory,
        info: DispatchInfo,
    ) -> BoxFuture<'_, Result<DispatchResponse>> {
        Box::pin(async move {
            let target = info
                .resource
                .strip_prefix("local://")
                .unwrap_or(info.resource.as_str());
            match target {
                "echo" => Ok(DispatchResponse::Completed { output: info.input }),
                "accept" => Ok(DispatchResponse::Accepted),
                "fail" => Err(FlowError::Dispatch(format!(
                    "{} failed on purpose (attempt {})",
                    info.task_name, info.attempt
                ))),
                other => Err(FlowError::Dispatch(format!("unknown local target '{other}'"))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::FunctionPattern;
    use crate::types::Context;
    use serde_json::json;

    fn info(resource: &str) -> DispatchInfo {
        let mut input = Context::new();
        input.insert("x".into(), json!(1));
        DispatchInfo {
            execution_id: "e".into(),
            task_name: "A".into(),
            category: TaskCategory::Function,
            resource: resource.into(),
            pattern: FunctionPattern::TaskSync,
            input,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn echo_returns_input_and_fail_errors() {
        let d = LocalDispatcher;
        match d.dispatch(TaskCategory::Function, info("local://echo")).await.unwrap() {
            DispatchResponse::Completed { output } => assert_eq!(output.get("x"), Some(&json!(1))),
            other => panic!("unexpected {other:?}"),
        }
        assert!(d.dispatch(TaskCategory::Function, info("local://fail")).await.is_err());
        assert_eq!(
            d.dispatch(TaskCategory::Function, info("local://accept")).await.unwrap(),
            DispatchResponse::Accepted
        );
    }
}
