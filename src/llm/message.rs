// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! A conversation is an ordered sequence of [`Turn`]s, each owned by one
//! [`Role`] and made of ordered [`ContentBlock`]s. Block order inside a turn
//! is preserved everywhere it flows; nothing in this crate reorders blocks.

use serde::{Deserialize, Serialize};

/// Role of the turn author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User turn (also carries tool results)
    User,
    /// Assistant turn (also carries tool invocations)
    Assistant,
}

/// Outcome status carried by a tool result block
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Success,
    Error,
}

/// A block of content within a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text { text: String },

    /// Model reasoning with its opaque signature
    Reasoning {
        text: String,
        #[serde(default)]
        signature: String,
    },

    /// Inline image
    Image { format: String, data: Vec<u8> },

    /// Inline document
    Document {
        format: String,
        data: Vec<u8>,
        name: String,
    },

    /// Tool invocation requested by the assistant
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool result returned by the user side
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        status: ToolStatus,
    },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Whether this is a tool invocation or tool result
    pub fn is_tool_block(&self) -> bool {
        matches!(
            self,
            ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. }
        )
    }

    /// Whether the block carries nothing worth sending
    pub fn is_blank(&self) -> bool {
        match self {
            ContentBlock::Text { text } => text.trim().is_empty(),
            ContentBlock::Reasoning { text, signature } => {
                text.trim().is_empty() && signature.is_empty()
            }
            ContentBlock::Image { data, .. } => data.is_empty(),
            ContentBlock::Document { data, .. } => data.is_empty(),
            ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => false,
        }
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// Role of the turn author
    pub role: Role,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl Turn {
    /// Create a turn from blocks
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Create a new user text turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create a new assistant text turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Create a user turn with content blocks
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::User, blocks)
    }

    /// Create an assistant turn with content blocks
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::Assistant, blocks)
    }

    /// Create a user turn holding a single tool result
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        status: ToolStatus,
    ) -> Self {
        Self::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            status,
        }])
    }

    /// Concatenate all text blocks in order, one per line
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check if the turn has no content blocks
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Check if the turn carries any tool invocation or result
    pub fn has_tool_blocks(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_block)
    }

    /// Ids of tool invocations in block order
    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ids referenced by tool results in block order
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_text_concatenates_in_order() {
        let turn = Turn::assistant_blocks(vec![
            ContentBlock::text("first"),
            ContentBlock::Reasoning {
                text: "hidden".to_string(),
                signature: "sig".to_string(),
            },
            ContentBlock::text("second"),
        ]);
        assert_eq!(turn.text(), "first\nsecond");
    }

    #[test]
    fn test_tool_ids() {
        let turn = Turn::assistant_blocks(vec![
            ContentBlock::text("checking"),
            ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "lookup".to_string(),
                input: json!({}),
            },
            ContentBlock::ToolUse {
                id: "t2".to_string(),
                name: "lookup".to_string(),
                input: json!({"q": 1}),
            },
        ]);
        assert!(turn.has_tool_blocks());
        assert_eq!(turn.tool_use_ids(), vec!["t1", "t2"]);
        assert!(turn.tool_result_ids().is_empty());

        let result = Turn::tool_result("t1", "42", ToolStatus::Success);
        assert_eq!(result.role, Role::User);
        assert_eq!(result.tool_result_ids(), vec!["t1"]);
        assert_eq!(result.text(), "");
    }

    #[test]
    fn test_blank_blocks() {
        assert!(ContentBlock::text("  \n").is_blank());
        assert!(!ContentBlock::text("x").is_blank());
        assert!(ContentBlock::Image {
            format: "png".to_string(),
            data: vec![],
        }
        .is_blank());
        assert!(!ContentBlock::ToolResult {
            tool_use_id: "t".to_string(),
            content: String::new(),
            status: ToolStatus::Error,
        }
        .is_blank());
    }

    #[test]
    fn test_serde_shape() {
        let turn = Turn::tool_result("t1", "boom", ToolStatus::Error);
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "tool_result");
        assert_eq!(value["content"][0]["status"], "error");

        let parsed: Turn = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, turn);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
