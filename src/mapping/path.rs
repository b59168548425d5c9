// src/mapping/path.rs

//! Dotted `$.scope.key.0` paths over JSON values.

use serde_json::{Map, Value};

use crate::errors::{FlowError, Result};

/// Split `$.a.b.0` into `["a", "b", "0"]`. `$` alone yields no segments.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim();
    let rest = trimmed
        .strip_prefix('$')
        .ok_or_else(|| FlowError::Mapping(format!("path must start with '$': {trimmed}")))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let rest = rest
        .strip_prefix('.')
        .ok_or_else(|| FlowError::Mapping(format!("malformed path: {trimmed}")))?;
    let parts: Vec<&str> = rest.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(FlowError::Mapping(format!("empty segment in path: {trimmed}")));
    }
    Ok(parts)
}

pub fn get<'v>(root: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    let mut current = root;
    for seg in segments {
        current = match current {
            Value::Object(map) => map.get(*seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `segments`, creating intermediate objects.
pub fn set(root: &mut Value, segments: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for seg in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index = seg
                    .parse::<usize>()
                    .map_err(|_| FlowError::Mapping(format!("'{seg}' is not an array index")))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| FlowError::Mapping(format!("index {index} out of bounds")))?
            }
            other => {
                return Err(FlowError::Mapping(format!(
                    "cannot descend into {} at '{seg}'",
                    type_name(other)
                )));
            }
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = last
                .parse::<usize>()
                .map_err(|_| FlowError::Mapping(format!("'{last}' is not an array index")))?;
            let len = items.len();
            match items.get_mut(index) {
                Some(slot) => *slot = value,
                None if index == len => items.push(value),
                None => return Err(FlowError::Mapping(format!("index {index} out of bounds"))),
            }
            Ok(())
        }
        other => Err(FlowError::Mapping(format!(
            "cannot write into {} at '{last}'",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
