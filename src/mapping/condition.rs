// src/mapping/condition.rs

//! Conditions are minijinja expressions evaluated over the
//! `{context, input, output}` scopes, for example
//! `output.code >= 500 and not input.dry_run`.
//!
//! Path references written the mapping way (`$.output.code`) are accepted
//! and read as the bare scope name. Missing keys are undefined, and
//! undefined is false.

use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior, Value as TemplateValue};
use regex::Regex;
use serde_json::Value;

use crate::errors::{FlowError, Result};

static SCOPE_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\.(context|input|output)\b").ok());

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env
}

fn normalize(condition: &str) -> Result<String> {
    let pattern = SCOPE_PATH
        .as_ref()
        .ok_or_else(|| FlowError::Mapping("scope path pattern failed to compile".to_string()))?;
    Ok(pattern.replace_all(condition, "$1").into_owned())
}

pub fn evaluate(scopes: &Value, condition: &str) -> Result<bool> {
    let source = normalize(condition)?;
    let env = environment();
    let expr = env
        .compile_expression(&source)
        .map_err(|e| FlowError::Mapping(format!("invalid condition '{condition}': {e}")))?;
    let result = expr
        .eval(TemplateValue::from_serialize(scopes))
        .map_err(|e| FlowError::Mapping(format!("condition '{condition}' failed: {e}")))?;
    Ok(result.is_true())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_and_negation() {
        let scopes = json!({ "input": { "yes": true, "empty": "", "n": 0 } });
        assert!(evaluate(&scopes, "input.yes").unwrap());
        assert!(!evaluate(&scopes, "input.empty").unwrap());
        assert!(!evaluate(&scopes, "input.missing").unwrap());
        assert!(!evaluate(&scopes, "input.missing.deeper").unwrap());
        assert!(evaluate(&scopes, "not input.n").unwrap());
    }

    #[test]
    fn comparisons_and_boolean_operators() {
        let scopes = json!({ "output": { "code": 2, "kind": "gold", "tags": ["a", "b"] } });
        assert!(evaluate(&scopes, "output.code == 2").unwrap());
        assert!(evaluate(&scopes, "output.code >= 2 and output.kind == 'gold'").unwrap());
        assert!(!evaluate(&scopes, "output.code < 1").unwrap());
        assert!(evaluate(&scopes, "output.kind != \"silver\" or false").unwrap());
        assert!(evaluate(&scopes, "'b' in output.tags").unwrap());
        assert!(evaluate(&scopes, "output.tags | length == 2").unwrap());
    }

    #[test]
    fn mapping_style_paths_are_accepted() {
        let scopes = json!({ "context": { "stop": true }, "output": { "code": 503 } });
        assert!(evaluate(&scopes, "$.context.stop").unwrap());
        assert!(evaluate(&scopes, "$.output.code >= 500 and not $.input.dry_run").unwrap());
    }

    #[test]
    fn malformed_expressions_are_mapping_errors() {
        assert!(matches!(
            evaluate(&json!({}), "output.code >="),
            Err(FlowError::Mapping(_))
        ));
    }
}
