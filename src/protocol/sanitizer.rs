// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Repair of accidental protocol violations
//!
//! Each pass strips blank blocks and empty turns, drops a user turn that
//! repeats the user turn right before it, merges neighbouring same-role turns
//! that carry no tool blocks, removes orphaned tool blocks, and makes sure
//! the view opens with a user turn. Passes repeat until nothing changes, so
//! `sanitize(sanitize(x)) == sanitize(x)`.

use std::collections::HashSet;

use serde::Serialize;

use crate::llm::message::{ContentBlock, Role, Turn};

/// Text left in an assistant turn whose only content was orphaned tool calls
pub const ASSISTANT_PLACEHOLDER: &str = "[tool call omitted]";

/// Text left in a user turn whose only content was orphaned tool results
pub const USER_PLACEHOLDER: &str = "[tool result omitted]";

/// Text of the synthetic user turn prepended when a view starts with the assistant
pub const SYNTHETIC_USER_TEXT: &str = "[conversation continues]";

const MAX_PASSES: usize = 16;

/// What the sanitizer changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub blank_blocks_removed: usize,
    pub empty_turns_removed: usize,
    pub duplicate_turns_removed: usize,
    pub turns_merged: usize,
    pub orphan_invocations_removed: usize,
    pub orphan_results_removed: usize,
    pub placeholders_inserted: usize,
    pub synthetic_user_prepended: bool,
}

impl RepairReport {
    /// Whether any repair happened
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Repair a turn sequence.
pub fn sanitize(turns: &[Turn]) -> Vec<Turn> {
    sanitize_with_report(turns).0
}

/// Repair a turn sequence and report what changed.
pub fn sanitize_with_report(turns: &[Turn]) -> (Vec<Turn>, RepairReport) {
    let mut report = RepairReport::default();
    let mut current = turns.to_vec();

    for _ in 0..MAX_PASSES {
        let next = sanitize_pass(current.clone(), &mut report);
        if next == current {
            break;
        }
        current = next;
    }

    if !report.is_clean() {
        tracing::debug!(
            target: "colloquy.protocol.sanitizer",
            input_turns = turns.len(),
            output_turns = current.len(),
            ?report,
            "repaired transmission view"
        );
    }

    (current, report)
}

fn sanitize_pass(turns: Vec<Turn>, report: &mut RepairReport) -> Vec<Turn> {
    let turns = strip_blank(turns, report);
    let turns = drop_repeated_user_turns(turns, report);
    let turns = merge_same_role(turns, report);
    let turns = remove_orphans(turns, report);
    ensure_user_first(turns, report)
}

fn strip_blank(turns: Vec<Turn>, report: &mut RepairReport) -> Vec<Turn> {
    let mut out = Vec::with_capacity(turns.len());
    for mut turn in turns {
        let before = turn.content.len();
        turn.content.retain(|block| !block.is_blank());
        report.blank_blocks_removed += before - turn.content.len();

        if turn.content.is_empty() {
            report.empty_turns_removed += 1;
        } else {
            out.push(turn);
        }
    }
    out
}

fn is_plain_user_text(turn: &Turn) -> bool {
    turn.role == Role::User && !turn.has_tool_blocks()
}

fn drop_repeated_user_turns(turns: Vec<Turn>, report: &mut RepairReport) -> Vec<Turn> {
    let mut out: Vec<Turn> = Vec::with_capacity(turns.len());
    for turn in turns {
        if let Some(previous) = out.last() {
            if is_plain_user_text(previous) && is_plain_user_text(&turn) {
                let text = turn.text();
                if !text.is_empty() && text == previous.text() {
                    report.duplicate_turns_removed += 1;
                    continue;
                }
            }
        }
        out.push(turn);
    }
    out
}

fn merge_same_role(turns: Vec<Turn>, report: &mut RepairReport) -> Vec<Turn> {
    let mut out: Vec<Turn> = Vec::with_capacity(turns.len());
    for turn in turns {
        if let Some(previous) = out.last_mut() {
            if previous.role == turn.role && !previous.has_tool_blocks() && !turn.has_tool_blocks()
            {
                previous.content.extend(turn.content);
                report.turns_merged += 1;
                continue;
            }
        }
        out.push(turn);
    }
    out
}

fn remove_orphans(turns: Vec<Turn>, report: &mut RepairReport) -> Vec<Turn> {
    let mut out: Vec<Turn> = Vec::with_capacity(turns.len());
    let mut seen_invocations: HashSet<String> = HashSet::new();

    for (i, turn) in turns.iter().enumerate() {
        let answered: HashSet<&str> = match turns.get(i + 1) {
            Some(next) if next.role == Role::User => next.tool_result_ids().into_iter().collect(),
            _ => HashSet::new(),
        };
        let offered: HashSet<&str> = match out.last() {
            Some(previous) if previous.role == Role::Assistant && turn.role == Role::User => {
                previous.tool_use_ids().into_iter().collect()
            }
            _ => HashSet::new(),
        };

        let mut answered_here: HashSet<&str> = HashSet::new();
        let mut content = Vec::with_capacity(turn.content.len());
        for block in &turn.content {
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    let keep = turn.role == Role::Assistant
                        && answered.contains(id.as_str())
                        && !seen_invocations.contains(id);
                    if keep {
                        seen_invocations.insert(id.clone());
                        content.push(block.clone());
                    } else {
                        report.orphan_invocations_removed += 1;
                    }
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    let id = tool_use_id.as_str();
                    if offered.contains(id) && answered_here.insert(id) {
                        content.push(block.clone());
                    } else {
                        report.orphan_results_removed += 1;
                    }
                }
                _ => content.push(block.clone()),
            }
        }

        if content.is_empty() {
            report.placeholders_inserted += 1;
            content.push(ContentBlock::text(match turn.role {
                Role::Assistant => ASSISTANT_PLACEHOLDER,
                Role::User => USER_PLACEHOLDER,
            }));
        }
        out.push(Turn::new(turn.role, content));
    }
    out
}

fn ensure_user_first(mut turns: Vec<Turn>, report: &mut RepairReport) -> Vec<Turn> {
    if turns.first().is_some_and(|turn| turn.role != Role::User) {
        turns.insert(0, Turn::user(SYNTHETIC_USER_TEXT));
        report.synthetic_user_prepended = true;
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::ToolStatus;
    use crate::protocol::validate;
    use serde_json::json;

    fn tool_use(id: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.to_string(),
            name: "lookup".to_string(),
            input: json!({}),
        }
    }

    fn tool_result(id: &str) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: "42".to_string(),
            status: ToolStatus::Success,
        }
    }

    #[test]
    fn test_clean_history_is_untouched() {
        let turns = vec![
            Turn::user("X"),
            Turn::assistant_blocks(vec![ContentBlock::text("Checking."), tool_use("t1")]),
            Turn::user_blocks(vec![tool_result("t1")]),
            Turn::assistant("42"),
        ];
        let (out, report) = sanitize_with_report(&turns);
        assert_eq!(out, turns);
        assert!(report.is_clean());
    }

    #[test]
    fn test_orphan_invocation_replaced_by_placeholder() {
        let turns = vec![
            Turn::assistant_blocks(vec![tool_use("t1")]),
            Turn::user("hi"),
        ];
        let (out, report) = sanitize_with_report(&turns);

        assert_eq!(report.orphan_invocations_removed, 1);
        let assistant = out
            .iter()
            .find(|t| t.role == Role::Assistant)
            .expect("assistant turn kept");
        assert_eq!(assistant.content, vec![ContentBlock::text(ASSISTANT_PLACEHOLDER)]);
        assert!(out.iter().all(|t| !t.has_tool_blocks()));
        assert!(validate(&out).is_ok());
    }

    #[test]
    fn test_orphan_result_removed() {
        let turns = vec![
            Turn::user("X"),
            Turn::assistant("no tools here"),
            Turn::user_blocks(vec![tool_result("t7"), ContentBlock::text("and a note")]),
        ];
        let out = sanitize(&turns);
        assert_eq!(out[2], Turn::user("and a note"));
        assert!(validate(&out).is_ok());
    }

    #[test]
    fn test_merges_text_only_turns_preserving_order() {
        let turns = vec![
            Turn::user("one"),
            Turn::user("two"),
            Turn::assistant("a"),
            Turn::assistant("b"),
        ];
        let out = sanitize(&turns);
        assert_eq!(
            out,
            vec![
                Turn::user_blocks(vec![ContentBlock::text("one"), ContentBlock::text("two")]),
                Turn::assistant_blocks(vec![ContentBlock::text("a"), ContentBlock::text("b")]),
            ]
        );
    }

    #[test]
    fn test_tool_turns_are_not_merged() {
        let turns = vec![
            Turn::user("X"),
            Turn::assistant_blocks(vec![ContentBlock::text("go"), tool_use("t1")]),
            Turn::user_blocks(vec![tool_result("t1")]),
            Turn::user("next question"),
        ];
        let out = sanitize(&turns);
        assert_eq!(out.len(), 4);
        assert_eq!(out[2], Turn::user_blocks(vec![tool_result("t1")]));
    }

    #[test]
    fn test_drops_repeated_user_turn() {
        let turns = vec![Turn::user("Hello"), Turn::user("Hello"), Turn::assistant("Hi")];
        let (out, report) = sanitize_with_report(&turns);
        assert_eq!(out, vec![Turn::user("Hello"), Turn::assistant("Hi")]);
        assert_eq!(report.duplicate_turns_removed, 1);
    }

    #[test]
    fn test_strips_blank_blocks_and_empty_turns() {
        let turns = vec![
            Turn::user_blocks(vec![ContentBlock::text(""), ContentBlock::text("hi")]),
            Turn::assistant_blocks(vec![]),
            Turn::assistant("hello"),
        ];
        let (out, report) = sanitize_with_report(&turns);
        assert_eq!(out, vec![Turn::user("hi"), Turn::assistant("hello")]);
        assert_eq!(report.blank_blocks_removed, 1);
        assert_eq!(report.empty_turns_removed, 1);
    }

    #[test]
    fn test_prepends_user_turn() {
        let out = sanitize(&[Turn::assistant("summary"), Turn::user("continue")]);
        assert_eq!(out[0], Turn::user(SYNTHETIC_USER_TEXT));
        assert_eq!(out.len(), 3);
        assert!(validate(&out).is_ok());
    }

    #[test]
    fn test_duplicate_invocation_id_keeps_first_pair() {
        let turns = vec![
            Turn::user("X"),
            Turn::assistant_blocks(vec![ContentBlock::text("a"), tool_use("t1")]),
            Turn::user_blocks(vec![tool_result("t1")]),
            Turn::assistant_blocks(vec![ContentBlock::text("b"), tool_use("t1")]),
            Turn::user_blocks(vec![tool_result("t1")]),
        ];
        let out = sanitize(&turns);
        assert_eq!(out[1].tool_use_ids(), vec!["t1"]);
        assert!(out[3].tool_use_ids().is_empty());
        assert!(out[4].tool_result_ids().is_empty());
        assert!(validate(&out).is_ok());
    }

    #[test]
    fn test_idempotent_on_messy_input() {
        let turns = vec![
            Turn::assistant_blocks(vec![tool_use("t1")]),
            Turn::assistant("dangling"),
            Turn::user_blocks(vec![tool_result("t2")]),
            Turn::user("q"),
            Turn::user("q"),
        ];
        let once = sanitize(&turns);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_empty_input() {
        assert!(sanitize(&[]).is_empty());
    }
}
