// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Colloquy
//!
//! Handles loading and saving settings from ~/.colloquy/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod io;
mod validation;

/// Main settings structure, stored in ~/.colloquy/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Transmission window sizing
    #[serde(default)]
    pub window: WindowConfig,

    /// Tool-invocation loop settings
    #[serde(default)]
    pub tool_loop: ToolLoopConfig,

    /// Duplicate-submission guard settings
    #[serde(default)]
    pub guard: GuardConfig,

    /// Durable history location
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Budget and weights for the transmission window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    /// Weighted size above which older turns are condensed
    #[serde(default = "default_budget_units")]
    pub budget_units: usize,

    /// Turns kept verbatim after condensation
    #[serde(default = "default_recent_turns")]
    pub recent_turns: usize,

    /// Characters per weighted unit for text
    #[serde(default = "default_chars_per_unit")]
    pub chars_per_unit: usize,

    /// Fixed weight added per block
    #[serde(default = "default_block_overhead_units")]
    pub block_overhead_units: usize,

    /// Fixed weight of an image block
    #[serde(default = "default_image_units")]
    pub image_units: usize,

    /// Fixed weight of a document block (name length is added)
    #[serde(default = "default_document_units")]
    pub document_units: usize,

    /// Requested upper bound for a summary
    #[serde(default = "default_summary_max_units")]
    pub summary_max_units: usize,

    /// Tool inputs larger than this (serialized chars) are simplified in the view
    #[serde(default = "default_tool_input_char_limit")]
    pub tool_input_char_limit: usize,
}

/// Settings for the tool-invocation loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolLoopConfig {
    /// Model requested from the transport
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum response tokens per round
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Hard cap on tool rounds per submission
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Fixed delay before the single timeout retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Longest wait for the next stream chunk
    #[serde(default = "default_stream_idle_timeout_ms")]
    pub stream_idle_timeout_ms: u64,

    /// System prompt sent with every round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Settings for the duplicate-submission guard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardConfig {
    /// Identical text resent within this window is rejected
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
}

/// Where durable history lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Directory holding one JSONL file per conversation
    #[serde(default = "default_history_directory")]
    pub directory: PathBuf,
}

fn default_budget_units() -> usize {
    90_000
}

fn default_recent_turns() -> usize {
    10
}

fn default_chars_per_unit() -> usize {
    3
}

fn default_block_overhead_units() -> usize {
    4
}

fn default_image_units() -> usize {
    1_600
}

fn default_document_units() -> usize {
    2_000
}

fn default_summary_max_units() -> usize {
    3_000
}

fn default_tool_input_char_limit() -> usize {
    16_000
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_tool_rounds() -> usize {
    24
}

fn default_retry_backoff_ms() -> u64 {
    30_000
}

fn default_stream_idle_timeout_ms() -> u64 {
    120_000
}

fn default_duplicate_window_ms() -> u64 {
    2_000
}

fn default_history_directory() -> PathBuf {
    Settings::colloquy_home().join("history")
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            budget_units: default_budget_units(),
            recent_turns: default_recent_turns(),
            chars_per_unit: default_chars_per_unit(),
            block_overhead_units: default_block_overhead_units(),
            image_units: default_image_units(),
            document_units: default_document_units(),
            summary_max_units: default_summary_max_units(),
            tool_input_char_limit: default_tool_input_char_limit(),
        }
    }
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_tool_rounds: default_max_tool_rounds(),
            retry_backoff_ms: default_retry_backoff_ms(),
            stream_idle_timeout_ms: default_stream_idle_timeout_ms(),
            system_prompt: None,
        }
    }
}

impl ToolLoopConfig {
    /// Delay before the timeout retry
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Idle limit between stream chunks
    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: default_duplicate_window_ms(),
        }
    }
}

impl GuardConfig {
    /// Duplicate-detection window
    pub fn duplicate_window(&self) -> Duration {
        Duration::from_millis(self.duplicate_window_ms)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            directory: default_history_directory(),
        }
    }
}
