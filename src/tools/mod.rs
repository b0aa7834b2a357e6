// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution seam
//!
//! The orchestrator never runs tools itself. It hands `(id, name, input)` to
//! a [`ToolExecutor`] and turns the returned [`ToolOutcome`] into a
//! tool-result block. Tools may return several kinds of output; only a
//! flattened text form reaches the conversation.

pub mod mock;
pub mod registry;

pub use mock::MockToolExecutor;
pub use registry::{Tool, ToolRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::llm::message::ToolStatus;
use crate::llm::provider::ToolDefinition;

/// One piece of tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Text { text: String },
    Image { format: String, data: Vec<u8> },
    Audio { format: String, data: Vec<u8> },
    Resource { uri: String, text: Option<String> },
}

impl ToolOutput {
    /// Text form used inside a tool-result block
    pub fn flatten(&self) -> String {
        match self {
            ToolOutput::Text { text } => text.clone(),
            ToolOutput::Image { format, data } => {
                format!("[image: {format}, {} bytes]", data.len())
            }
            ToolOutput::Audio { format, data } => {
                format!("[audio: {format}, {} bytes]", data.len())
            }
            ToolOutput::Resource { uri, text } => match text {
                Some(text) => format!("[resource: {uri}]\n{text}"),
                None => format!("[resource: {uri}]"),
            },
        }
    }
}

/// What a tool execution produced
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub result_text: String,
    pub error: Option<String>,
}

impl ToolOutcome {
    /// Successful text result
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            result_text: text.into(),
            error: None,
        }
    }

    /// Failed execution; the message is what the model sees
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ToolStatus::Error,
            result_text: message.clone(),
            error: Some(message),
        }
    }

    /// Successful result built from multi-part output
    pub fn from_outputs(outputs: &[ToolOutput]) -> Self {
        let text = outputs
            .iter()
            .map(ToolOutput::flatten)
            .collect::<Vec<_>>()
            .join("\n");
        Self::success(text)
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// Text placed in the tool-result block. Error outcomes with no result
    /// text fall back to the error message.
    pub fn result_content(&self) -> String {
        if self.result_text.is_empty() {
            if let Some(error) = &self.error {
                return error.clone();
            }
        }
        self.result_text.clone()
    }
}

/// Runs tools on behalf of the orchestrator
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute tool `name` for invocation `id`.
    ///
    /// An `Err` here is recorded as an error result and the cycle continues.
    async fn execute(&self, id: &str, name: &str, input: Value) -> Result<ToolOutcome>;

    /// Tool specs offered to the model
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }
}
