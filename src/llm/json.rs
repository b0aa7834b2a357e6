// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Helpers for loosely-typed tool payloads
//!
//! Tool inputs are arbitrary JSON. The window estimator needs their size and
//! the transmission view needs a bounded copy of oversized inputs.

use serde_json::{Map, Value};

/// Bounds applied by [`simplify_json`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimplifyLimits {
    /// Strings longer than this (in chars) are cut
    pub max_string_chars: usize,
    /// Arrays longer than this keep only their head
    pub max_array_items: usize,
    /// Objects with more keys keep only the first ones
    pub max_object_keys: usize,
    /// Values nested deeper than this are replaced by a marker
    pub max_depth: usize,
}

impl Default for SimplifyLimits {
    fn default() -> Self {
        Self {
            max_string_chars: 2_000,
            max_array_items: 50,
            max_object_keys: 100,
            max_depth: 8,
        }
    }
}

/// Estimate the serialized size of a JSON value in characters.
///
/// Exact for values whose strings need no escaping.
pub fn estimate_json_size(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(true) => 4,
        Value::Bool(false) => 5,
        Value::Number(n) => n.to_string().len(),
        Value::String(s) => s.len() + 2,
        Value::Array(items) => {
            2 + items.iter().map(estimate_json_size).sum::<usize>()
                + items.len().saturating_sub(1)
        }
        Value::Object(map) => {
            2 + map
                .iter()
                .map(|(key, v)| key.len() + 3 + estimate_json_size(v))
                .sum::<usize>()
                + map.len().saturating_sub(1)
        }
    }
}

/// Return a copy of `value` bounded by `limits`.
pub fn simplify_json(value: &Value, limits: &SimplifyLimits) -> Value {
    simplify_at_depth(value, limits, 0)
}

fn simplify_at_depth(value: &Value, limits: &SimplifyLimits, depth: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_string(s, limits.max_string_chars)),
        Value::Array(_) | Value::Object(_) if depth >= limits.max_depth => {
            Value::String("[nested value omitted]".to_string())
        }
        Value::Array(items) => {
            let mut out: Vec<Value> = items
                .iter()
                .take(limits.max_array_items)
                .map(|item| simplify_at_depth(item, limits, depth + 1))
                .collect();
            if items.len() > limits.max_array_items {
                out.push(Value::String(format!(
                    "[{} more items]",
                    items.len() - limits.max_array_items
                )));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, v) in map.iter().take(limits.max_object_keys) {
                out.insert(key.clone(), simplify_at_depth(v, limits, depth + 1));
            }
            if map.len() > limits.max_object_keys {
                out.insert(
                    "_omitted_keys".to_string(),
                    Value::from(map.len() - limits.max_object_keys),
                );
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn truncate_string(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    if total <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}...[truncated {} chars]", total - max_chars)
}
