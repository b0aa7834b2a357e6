// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! This module folds transport events into a finished assistant response. It
//! does no I/O; the engine feeds it events and reads back plain values.

use serde_json::Value;

use crate::llm::message::{ContentBlock, Turn};
use crate::llm::provider::{StopReason, StreamEvent};

/// Text of an assistant turn when the model produced nothing at all
pub const EMPTY_RESPONSE_TEXT: &str = "[no response]";

/// Text of a tool-round assistant turn when the model streamed no text
pub const TOOL_ROUND_TEXT: &str = "[calling tools]";

/// A tool call detected in a response
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug)]
struct PendingToolCall {
    id: String,
    name: String,
    input_json: String,
}

impl PendingToolCall {
    fn complete(self) -> ToolCall {
        let input = if self.input_json.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&self.input_json) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        target: "colloquy.chat.engine",
                        tool = %self.name,
                        tool_use_id = %self.id,
                        error = %e,
                        "unparseable tool input, using empty object"
                    );
                    Value::Object(Default::default())
                }
            }
        };
        ToolCall {
            id: self.id,
            name: self.name,
            input,
        }
    }
}

/// Accumulator for streaming response content
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    reasoning: String,
    signature: Option<String>,
    tool_calls: Vec<ToolCall>,
    pending: Option<PendingToolCall>,
    stop_reason: Option<StopReason>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a stream event and report what it meant
    pub fn process_event(&mut self, event: StreamEvent) -> StreamEventResult {
        match event {
            StreamEvent::TextDelta(text) => {
                self.text.push_str(&text);
                StreamEventResult::TextDelta(text)
            }
            StreamEvent::ReasoningDelta(text) => {
                self.reasoning.push_str(&text);
                StreamEventResult::ReasoningDelta(text)
            }
            StreamEvent::ReasoningSignature(signature) => {
                self.signature = Some(signature);
                StreamEventResult::Progress
            }
            StreamEvent::ToolCallStart { id, name } => {
                self.close_pending();
                self.pending = Some(PendingToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input_json: String::new(),
                });
                StreamEventResult::ToolCallStarted { id, name }
            }
            StreamEvent::ToolCallInputDelta { partial_json } => {
                match &mut self.pending {
                    Some(pending) => pending.input_json.push_str(&partial_json),
                    None => tracing::warn!(
                        target: "colloquy.chat.engine",
                        "tool input delta without an open tool call"
                    ),
                }
                StreamEventResult::Progress
            }
            StreamEvent::ToolCallEnd => match self.close_pending() {
                Some(call) => StreamEventResult::ToolCallCompleted(call),
                None => StreamEventResult::Progress,
            },
            StreamEvent::Done(stop_reason) => {
                self.close_pending();
                self.stop_reason = Some(stop_reason);
                StreamEventResult::Done(stop_reason)
            }
        }
    }

    fn close_pending(&mut self) -> Option<ToolCall> {
        let call = self.pending.take()?.complete();
        self.tool_calls.push(call.clone());
        Some(call)
    }

    /// Consume the accumulator and return the final response
    pub fn finish(mut self) -> AccumulatedResponse {
        self.close_pending();
        let reasoning = if self.reasoning.is_empty() && self.signature.is_none() {
            None
        } else {
            Some(ContentBlock::Reasoning {
                text: self.reasoning,
                signature: self.signature.unwrap_or_default(),
            })
        };
        AccumulatedResponse {
            text: self.text,
            reasoning,
            tool_calls: self.tool_calls,
            stop_reason: self.stop_reason,
        }
    }
}

/// A fully accumulated model response
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedResponse {
    pub text: String,
    pub reasoning: Option<ContentBlock>,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
}

impl AccumulatedResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The assistant turn for the durable log: reasoning first, then text,
    /// then every invocation in stream order. A tool round always carries a
    /// non-empty text block.
    pub fn assistant_turn(&self) -> Turn {
        let mut content = Vec::with_capacity(self.tool_calls.len() + 2);
        if let Some(reasoning) = &self.reasoning {
            content.push(reasoning.clone());
        }
        if !self.text.trim().is_empty() {
            content.push(ContentBlock::text(self.text.clone()));
        } else if self.has_tool_calls() {
            content.push(ContentBlock::text(TOOL_ROUND_TEXT));
        }
        for call in &self.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        // Reasoning alone is not a usable reply.
        if content.iter().all(|block| matches!(block, ContentBlock::Reasoning { .. })) {
            content.push(ContentBlock::text(EMPTY_RESPONSE_TEXT));
        }
        Turn::assistant_blocks(content)
    }
}

/// Result of processing a stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventResult {
    /// Text delta received (contains the text to display)
    TextDelta(String),
    /// Reasoning delta received
    ReasoningDelta(String),
    /// A tool call opened
    ToolCallStarted { id: String, name: String },
    /// A tool call closed with its parsed input
    ToolCallCompleted(ToolCall),
    /// Bookkeeping event with nothing to show
    Progress,
    /// The stream finished
    Done(StopReason),
}
