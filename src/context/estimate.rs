// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Weighted size estimation for turns
//!
//! All weights are in one unit (roughly tokens): text counts its characters
//! divided by `chars_per_unit`, binary attachments count a fixed amount, and
//! tool blocks count their JSON payload.

use crate::config::WindowConfig;
use crate::llm::json::estimate_json_size;
use crate::llm::message::{ContentBlock, Turn};

/// Weight of a single content block.
pub fn estimate_block(block: &ContentBlock, config: &WindowConfig) -> usize {
    let per_unit = config.chars_per_unit.max(1);
    let overhead = config.block_overhead_units;

    match block {
        ContentBlock::Text { text } => text.chars().count() / per_unit + overhead,
        ContentBlock::Reasoning { text, .. } => text.chars().count() / per_unit + overhead,
        ContentBlock::Image { .. } => config.image_units,
        ContentBlock::Document { name, .. } => config.document_units + name.chars().count(),
        ContentBlock::ToolUse { name, input, .. } => {
            overhead + (name.len() + estimate_json_size(input)) / per_unit
        }
        ContentBlock::ToolResult { content, .. } => {
            overhead + content.chars().count() / per_unit
        }
    }
}

/// Weight of a turn.
pub fn estimate_turn(turn: &Turn, config: &WindowConfig) -> usize {
    turn.content
        .iter()
        .map(|block| estimate_block(block, config))
        .sum()
}

/// Weight of a whole view.
pub fn estimate_turns(turns: &[Turn], config: &WindowConfig) -> usize {
    turns.iter().map(|turn| estimate_turn(turn, config)).sum()
}
