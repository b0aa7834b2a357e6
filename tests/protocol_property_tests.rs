// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use proptest::prelude::*;
use serde_json::json;

use colloquy::llm::message::{ContentBlock, Role, ToolStatus, Turn};
use colloquy::protocol::{sanitize, validate, Violation};

fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::User), Just(Role::Assistant)]
}

fn block_strategy() -> impl Strategy<Value = ContentBlock> {
    prop_oneof![
        "[ab ]{0,3}".prop_map(ContentBlock::text),
        "t[0-3]".prop_map(|id| ContentBlock::ToolUse {
            id,
            name: "lookup".to_string(),
            input: json!({}),
        }),
        "t[0-3]".prop_map(|id| ContentBlock::ToolResult {
            tool_use_id: id,
            content: "ok".to_string(),
            status: ToolStatus::Success,
        }),
    ]
}

fn turn_strategy() -> impl Strategy<Value = Turn> {
    (role_strategy(), prop::collection::vec(block_strategy(), 0..4))
        .prop_map(|(role, content)| Turn::new(role, content))
}

fn history_strategy() -> impl Strategy<Value = Vec<Turn>> {
    prop::collection::vec(turn_strategy(), 0..12)
}

fn text_history_strategy() -> impl Strategy<Value = Vec<Turn>> {
    prop::collection::vec(
        (role_strategy(), "[a-z]{1,6}").prop_map(|(role, text)| {
            Turn::new(role, vec![ContentBlock::text(text)])
        }),
        1..12,
    )
}

/// Alternating exchanges, some of them with a tool round in between.
fn well_formed_strategy() -> impl Strategy<Value = Vec<Turn>> {
    prop::collection::vec(("[a-z]{1,6}", 0usize..3), 1..6).prop_map(|exchanges| {
        let mut turns = Vec::new();
        let mut next_id = 0;
        for (text, tool_rounds) in exchanges {
            turns.push(Turn::user(format!("ask {text}")));
            for _ in 0..tool_rounds {
                let id = format!("call_{next_id}");
                next_id += 1;
                turns.push(Turn::assistant_blocks(vec![ContentBlock::ToolUse {
                    id: id.clone(),
                    name: "lookup".to_string(),
                    input: json!({"q": text.as_str()}),
                }]));
                turns.push(Turn::tool_result(id, "found", ToolStatus::Success));
            }
            turns.push(Turn::assistant(format!("reply {text}")));
        }
        turns
    })
}

fn violations(turns: &[Turn]) -> Vec<Violation> {
    match validate(turns) {
        Ok(()) => Vec::new(),
        Err(error) => error.violations,
    }
}

proptest! {
    #[test]
    fn sanitize_is_idempotent(turns in history_strategy()) {
        let once = sanitize(&turns);
        prop_assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn sanitized_tool_blocks_are_always_paired(turns in history_strategy()) {
        let out = sanitize(&turns);
        for violation in violations(&out) {
            let tolerated = matches!(
                violation,
                Violation::EmptyView | Violation::ConsecutiveRoles { .. }
            );
            prop_assert!(tolerated, "unexpected violation: {}", violation);
        }
    }

    #[test]
    fn sanitized_view_opens_with_user(turns in history_strategy()) {
        let out = sanitize(&turns);
        if let Some(first) = out.first() {
            prop_assert_eq!(first.role, Role::User);
        }
    }

    #[test]
    fn sanitized_text_history_is_valid(turns in text_history_strategy()) {
        let out = sanitize(&turns);
        prop_assert!(validate(&out).is_ok(), "violations: {:?}", violations(&out));
    }

    #[test]
    fn well_formed_history_passes_untouched(turns in well_formed_strategy()) {
        prop_assert!(validate(&turns).is_ok());
        prop_assert_eq!(sanitize(&turns), turns);
    }
}
