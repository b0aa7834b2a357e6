// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation titles

use crate::llm::message::{Role, Turn};
use crate::llm::provider::{CompletionRequest, LlmProvider};

/// Longest title returned, in characters
pub const TITLE_MAX_CHARS: usize = 100;

/// Title used when the conversation has no user text yet
pub const UNTITLED: &str = "New conversation";

const TITLE_INSTRUCTION: &str = "Write a short title (at most eight words) for the conversation \
below. Reply with the title only, without quotes or punctuation at the end.";

/// Generate a title from the first exchange.
///
/// Falls back to the first user text, truncated, when the completion fails
/// or comes back empty.
pub async fn generate_title(provider: &dyn LlmProvider, model: &str, turns: &[Turn]) -> String {
    let Some(first_user) = turns
        .iter()
        .find(|turn| turn.role == Role::User && !turn.text().trim().is_empty())
    else {
        return UNTITLED.to_string();
    };
    let user_text = first_user.text();
    let assistant_text = turns
        .iter()
        .find(|turn| turn.role == Role::Assistant && !turn.text().trim().is_empty())
        .map(Turn::text)
        .unwrap_or_default();

    let prompt = format!("User: {user_text}\nAssistant: {assistant_text}");
    let request = CompletionRequest::new(model, vec![Turn::user(prompt)])
        .with_system(TITLE_INSTRUCTION)
        .with_max_tokens(64);

    match provider.complete(request).await {
        Ok(response) => {
            let title = clean_title(&response.text);
            if title.is_empty() {
                fallback_title(&user_text)
            } else {
                title
            }
        }
        Err(e) => {
            tracing::debug!(
                target: "colloquy.chat.title",
                error = %e,
                "title generation failed, using first user text"
            );
            fallback_title(&user_text)
        }
    }
}

fn clean_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = line.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    truncate_chars(trimmed, TITLE_MAX_CHARS)
}

fn fallback_title(user_text: &str) -> String {
    let single_line = user_text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&single_line, TITLE_MAX_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
