// src/mapping/mod.rs

//! Input/output mapping capability.
//!
//! The engine consumes [`Mapper`]; it never interprets paths or conditions
//! itself. [`PathMapper`] is the default: mapping rules use dotted
//! `$.context` / `$.input` / `$.output` paths, and conditions are minijinja
//! expressions over the same three scopes (see [`condition`]).

pub mod condition;
pub mod path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::dag::Mapping;
use crate::errors::{FlowError, Result};
use crate::types::Context;

pub trait Mapper: Send + Sync {
    /// Apply `rules` in order. Sources and targets address the three scopes
    /// `$.context`, `$.input` and `$.output`.
    fn mapping(
        &self,
        context: &mut Context,
        input: &mut Context,
        output: &mut Context,
        rules: &[Mapping],
    ) -> Result<()>;

    /// Value at `path` within `scopes`.
    fn resolve(&self, scopes: &Value, path: &str) -> Result<Option<Value>>;

    /// Evaluate a boolean condition against `scopes`.
    fn evaluate(&self, scopes: &Value, condition: &str) -> Result<bool>;
}

/// Build the `{context, input, output}` value conditions are evaluated on.
pub fn scopes(context: &Context, input: &Context, output: &Context) -> Value {
    let mut root = Map::new();
    root.insert("context".to_string(), Value::Object(context.clone()));
    root.insert("input".to_string(), Value::Object(input.clone()));
    root.insert("output".to_string(), Value::Object(output.clone()));
    Value::Object(root)
}

/// Whether every condition holds. An empty list holds.
pub fn all_match(mapper: &dyn Mapper, scopes: &Value, conditions: &[String]) -> Result<bool> {
    for condition in conditions {
        if !mapper.evaluate(scopes, condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Whether any condition holds. An empty list does not.
pub fn any_match(mapper: &dyn Mapper, scopes: &Value, conditions: &[String]) -> Result<bool> {
    for condition in conditions {
        if mapper.evaluate(scopes, condition)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Default [`Mapper`] over dotted paths.
///
/// Supported transforms: `to_string`, `to_number`, `length`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathMapper;

impl PathMapper {
    fn transform(value: Value, transform: &str) -> Result<Value> {
        match transform.trim() {
            "to_string" => Ok(match value {
                Value::String(s) => Value::String(s),
                other => Value::String(other.to_string()),
            }),
            "to_number" => match &value {
                Value::Number(_) => Ok(value),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| FlowError::Mapping(format!("'{s}' is not a number"))),
                other => Err(FlowError::Mapping(format!("cannot convert {other} to a number"))),
            },
            "length" => match &value {
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                Value::String(s) => Ok(Value::from(s.chars().count())),
                other => Err(FlowError::Mapping(format!("{other} has no length"))),
            },
            other => Err(FlowError::Mapping(format!("unknown transform '{other}'"))),
        }
    }

    fn apply_rule(root: &mut Value, rule: &Mapping) -> Result<()> {
        let source = path::segments(&rule.source)?;
        let Some(value) = path::get(root, &source).cloned() else {
            debug!(source = %rule.source, "mapping source missing, rule skipped");
            return Ok(());
        };
        let value = match &rule.transform {
            Some(t) => Self::transform(value, t)?,
            None => value,
        };

        let target = path::segments(&rule.target)?;
        match target.first() {
            Some(&"context") | Some(&"input") | Some(&"output") => {}
            _ => {
                return Err(FlowError::Mapping(format!(
                    "target must be under $.context, $.input or $.output: {}",
                    rule.target
                )));
            }
        }
        if target.len() == 1 && !value.is_object() {
            return Err(FlowError::Mapping(format!(
                "only an object can replace a whole scope: {}",
                rule.target
            )));
        }
        path::set(root, &target, value)
    }
}

impl Mapper for PathMapper {
    fn mapping(
        &self,
        context: &mut Context,
        input: &mut Context,
        output: &mut Context,
        rules: &[Mapping],
    ) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }

        let mut root = Map::new();
        root.insert("context".to_string(), Value::Object(std::mem::take(context)));
        root.insert("input".to_string(), Value::Object(std::mem::take(input)));
        root.insert("output".to_string(), Value::Object(std::mem::take(output)));
        let mut root = Value::Object(root);

        let mut failure = None;
        for rule in rules {
            if let Err(err) = Self::apply_rule(&mut root, rule) {
                if rule.tolerance {
                    debug!(source = %rule.source, target = %rule.target, error = %err, "tolerated mapping failure");
                    continue;
                }
                failure = Some(err);
                break;
            }
        }

        // Hand the scopes back even when a rule failed half way.
        if let Value::Object(mut map) = root {
            for (slot, key) in [(context, "context"), (input, "input"), (output, "output")] {
                if let Some(Value::Object(scope)) = map.remove(key) {
                    *slot = scope;
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn resolve(&self, scopes: &Value, path: &str) -> Result<Option<Value>> {
        let segs = path::segments(path)?;
        Ok(path::get(scopes, &segs).cloned())
    }

    fn evaluate(&self, scopes: &Value, condition: &str) -> Result<bool> {
        condition::evaluate(scopes, condition)
    }
}
