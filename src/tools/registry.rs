// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Name-keyed tool registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::llm::provider::ToolDefinition;

use super::{ToolExecutor, ToolOutcome};

/// A single named tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition for the model
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with given input
    async fn execute(&self, input: Value) -> Result<ToolOutcome>;

    /// Get the tool name
    fn name(&self) -> &str;
}

/// Registry of available tools
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Names of registered tools, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, id: &str, name: &str, input: Value) -> Result<ToolOutcome> {
        let Some(tool) = self.get(name) else {
            return Ok(ToolOutcome::error(format!("Unknown tool: {name}")));
        };

        match tool.execute(input).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::debug!(
                    target: "colloquy.tools.registry",
                    tool = name,
                    tool_use_id = id,
                    error = %e,
                    "tool returned error"
                );
                Ok(ToolOutcome::error(e.to_string()))
            }
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ColloquyError;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("echo", "Echo the input back", json!({"type": "object"}))
        }

        async fn execute(&self, input: Value) -> Result<ToolOutcome> {
            match input.get("text").and_then(Value::as_str) {
                Some(text) => Ok(ToolOutcome::success(text)),
                None => Err(ColloquyError::InvalidInput("missing text".to_string())),
            }
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[tokio::test]
    async fn test_registry_executes_tool() {
        let outcome = registry()
            .execute("t1", "echo", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::success("hi"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_outcome() {
        let outcome = registry().execute("t1", "nope", json!({})).await.unwrap();
        assert!(outcome.is_error());
        assert!(outcome.result_text.contains("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_outcome() {
        let outcome = registry().execute("t1", "echo", json!({})).await.unwrap();
        assert!(outcome.is_error());
        assert!(outcome.result_text.contains("missing text"));
    }

    #[test]
    fn test_definitions() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.definitions()[0].name, "echo");
    }
}
