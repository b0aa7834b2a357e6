// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Scripted tool executor for tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ColloquyError, Result};
use crate::llm::provider::ToolDefinition;

use super::{ToolExecutor, ToolOutcome};

/// A recorded tool call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Scripted behaviour for one tool name
#[derive(Debug, Clone)]
pub enum MockToolBehavior {
    /// Return this outcome
    Outcome(ToolOutcome),
    /// Return `Err` from the executor
    Fail(String),
    /// Sleep, then return the outcome
    Delayed(Duration, ToolOutcome),
}

/// A mock tool executor
#[derive(Clone)]
pub struct MockToolExecutor {
    behaviors: Arc<Mutex<HashMap<String, MockToolBehavior>>>,
    fallback: ToolOutcome,
    calls: Arc<Mutex<Vec<RecordedToolCall>>>,
    completed: Arc<Mutex<Vec<String>>>,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(
                target: "colloquy.tools.mock",
                "Mock tool executor lock was poisoned, recovering"
            );
            poisoned.into_inner()
        }
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToolExecutor {
    /// Every tool succeeds with "ok" unless scripted otherwise
    pub fn new() -> Self {
        Self {
            behaviors: Arc::new(Mutex::new(HashMap::new())),
            fallback: ToolOutcome::success("ok"),
            calls: Arc::new(Mutex::new(Vec::new())),
            completed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script the behaviour of one tool
    pub fn with_tool(self, name: impl Into<String>, behavior: MockToolBehavior) -> Self {
        lock_or_recover(&self.behaviors).insert(name.into(), behavior);
        self
    }

    /// Script a plain outcome for one tool
    pub fn with_outcome(self, name: impl Into<String>, outcome: ToolOutcome) -> Self {
        self.with_tool(name, MockToolBehavior::Outcome(outcome))
    }

    /// Calls received, in order
    pub fn calls(&self) -> Vec<RecordedToolCall> {
        lock_or_recover(&self.calls).clone()
    }

    /// Ids of calls that ran to completion
    pub fn completed(&self) -> Vec<String> {
        lock_or_recover(&self.completed).clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, id: &str, name: &str, input: Value) -> Result<ToolOutcome> {
        lock_or_recover(&self.calls).push(RecordedToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input,
        });

        let behavior = lock_or_recover(&self.behaviors).get(name).cloned();
        let result = match behavior {
            None => Ok(self.fallback.clone()),
            Some(MockToolBehavior::Outcome(outcome)) => Ok(outcome),
            Some(MockToolBehavior::Fail(message)) => Err(ColloquyError::InvalidInput(message)),
            Some(MockToolBehavior::Delayed(delay, outcome)) => {
                tokio::time::sleep(delay).await;
                Ok(outcome)
            }
        };

        lock_or_recover(&self.completed).push(id.to_string());
        result
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut names: Vec<String> = lock_or_recover(&self.behaviors).keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                ToolDefinition::new(
                    name,
                    "Scripted test tool",
                    serde_json::json!({"type": "object"}),
                )
            })
            .collect()
    }
}
