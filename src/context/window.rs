// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Transmission window management
//!
//! The durable history grows without bound; the view sent to the model does
//! not. When a plain-text history outgrows the budget, everything but the most
//! recent turns is condensed into a single assistant summary turn. The durable
//! history is untouched unless [`WindowManager::compact`] is called explicitly.

use std::sync::Arc;

use crate::config::WindowConfig;
use crate::error::Result;
use crate::llm::message::{Role, Turn};
use crate::llm::provider::{CompletionRequest, LlmProvider};

use super::estimate::estimate_turns;

const SUMMARY_INSTRUCTION: &str = "You condense earlier parts of a conversation so it can continue \
in a smaller context. Preserve every decision, conclusion, open question, name, and number the \
participants relied on. Compress repetition and small talk. Write plain prose, no preamble.";

/// Result of building a transmission view
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionView {
    /// Turns to send
    pub turns: Vec<Turn>,
    /// Number of older turns folded into a summary, if any
    pub compressed: Option<usize>,
}

impl TransmissionView {
    fn unchanged(turns: &[Turn]) -> Self {
        Self {
            turns: turns.to_vec(),
            compressed: None,
        }
    }
}

/// Decides when and how to condense older turns
#[derive(Clone)]
pub struct WindowManager {
    config: WindowConfig,
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl WindowManager {
    /// Create a manager that summarizes through `provider`.
    pub fn new(
        config: WindowConfig,
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            config,
            provider,
            model: model.into(),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Weighted size of `turns`.
    pub fn estimate(&self, turns: &[Turn]) -> usize {
        estimate_turns(turns, &self.config)
    }

    /// Whether [`transmission_view`](Self::transmission_view) would condense `turns`.
    pub fn needs_compression(&self, turns: &[Turn]) -> bool {
        needs_compression(turns, &self.config)
    }

    /// Build the view for one round.
    ///
    /// Short histories, histories carrying tool blocks, and histories within
    /// budget are returned as they are. Otherwise the result is exactly one
    /// assistant summary turn followed by the last `recent_turns` turns.
    pub async fn transmission_view(&self, turns: &[Turn]) -> TransmissionView {
        if !self.needs_compression(turns) {
            return TransmissionView::unchanged(turns);
        }

        let split = turns.len() - self.config.recent_turns;
        let (older, recent) = turns.split_at(split);
        let summary = self.summarize(older).await;

        tracing::info!(
            target: "colloquy.context.window",
            total_turns = turns.len(),
            compressed_turns = older.len(),
            kept_turns = recent.len(),
            "condensed transmission view"
        );

        let mut view = Vec::with_capacity(recent.len() + 1);
        view.push(summary);
        view.extend_from_slice(recent);
        TransmissionView {
            turns: view,
            compressed: Some(older.len()),
        }
    }

    /// Condense `older` into a summary turn. Never fails; a placeholder stands
    /// in when the completion does.
    pub async fn summarize(&self, older: &[Turn]) -> Turn {
        match self.request_summary(older).await {
            Ok(text) => Turn::assistant(format!(
                "[Summary of {} earlier turns]\n{}",
                older.len(),
                text
            )),
            Err(e) => {
                tracing::warn!(
                    target: "colloquy.context.window",
                    error = %e,
                    turns = older.len(),
                    "summary failed, using placeholder"
                );
                Turn::assistant(placeholder_summary(older.len()))
            }
        }
    }

    async fn request_summary(&self, older: &[Turn]) -> Result<String> {
        let prompt = format!(
            "Summarize the conversation below in at most {} tokens.\n\n{}",
            self.config.summary_max_units,
            render_transcript(older)
        );
        let request = CompletionRequest::new(self.model.clone(), vec![Turn::user(prompt)])
            .with_system(SUMMARY_INSTRUCTION)
            .with_max_tokens(u32::try_from(self.config.summary_max_units).unwrap_or(u32::MAX));

        let response = self.provider.complete(request).await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(crate::error::TransportError::InvalidResponse(
                "empty summary".to_string(),
            )
            .into());
        }
        Ok(text.to_string())
    }

    /// Rewrite the whole history into `[summary] + recent`, moving the split
    /// point back so no invocation/result pair is cut. Returns `None` when
    /// there is nothing older than the retained tail.
    ///
    /// The summary turn is assistant-role; callers run the sanitizer to open
    /// the result with a user turn.
    pub async fn compact(&self, turns: &[Turn]) -> Option<(Vec<Turn>, usize)> {
        let split = pair_safe_split(turns, self.config.recent_turns)?;
        let (older, recent) = turns.split_at(split);
        let summary = self.summarize(older).await;

        let mut compacted = Vec::with_capacity(recent.len() + 1);
        compacted.push(summary);
        compacted.extend_from_slice(recent);
        Some((compacted, older.len()))
    }
}

/// Condense only plain-text histories longer than the retained tail whose
/// weighted size exceeds the budget.
pub fn needs_compression(turns: &[Turn], config: &WindowConfig) -> bool {
    if turns.len() <= config.recent_turns {
        return false;
    }
    if turns.iter().any(Turn::has_tool_blocks) {
        return false;
    }
    estimate_turns(turns, config) > config.budget_units
}

/// Text of the summary used when condensation fails.
pub fn placeholder_summary(count: usize) -> String {
    format!("[{count} earlier turns compressed; summary unavailable]")
}

/// Index where the retained tail starts, moved back until it opens on a user
/// turn that carries no tool results. `None` if no older turns would remain.
pub fn pair_safe_split(turns: &[Turn], recent: usize) -> Option<usize> {
    if turns.len() <= recent {
        return None;
    }
    let mut split = turns.len() - recent;
    while split > 0 {
        let turn = &turns[split];
        if turn.role == Role::User && turn.tool_result_ids().is_empty() {
            return Some(split);
        }
        split -= 1;
    }
    None
}

fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let text = turn.text();
        if text.is_empty() {
            continue;
        }
        let label = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&text);
        out.push('\n');
    }
    out
}
