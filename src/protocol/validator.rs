// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Structural validation of a transmission view
//!
//! Checks run in a fixed order: empty turns, invocation/result pairing,
//! pair placement, then role alternation. Every violation found is reported,
//! in check order, so the caller sees the whole picture at once.

use std::collections::HashMap;

use crate::llm::message::{ContentBlock, Role, Turn};

/// One structural rule broken by a transmission view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Nothing to send at all
    EmptyView,
    /// Turn without content
    EmptyTurn { position: usize },
    /// Invocation id used more than once
    DuplicateInvocation {
        id: String,
        first: usize,
        second: usize,
    },
    /// Result id used more than once
    DuplicateResult {
        id: String,
        first: usize,
        second: usize,
    },
    /// Invocation with no result
    UnmatchedInvocation { id: String, position: usize },
    /// Result with no invocation
    UnmatchedResult { id: String, position: usize },
    /// Invocation inside a user turn
    MisplacedInvocation { id: String, position: usize },
    /// Result inside an assistant turn
    MisplacedResult { id: String, position: usize },
    /// Result at or before its invocation
    ResultBeforeInvocation {
        id: String,
        invocation: usize,
        result: usize,
    },
    /// Result not in the turn right after its invocation
    ResultNotAdjacent {
        id: String,
        invocation: usize,
        result: usize,
    },
    /// Conversation does not start with a user turn
    FirstTurnNotUser { role: Role },
    /// Two neighbouring turns share a role; `position` is the second one
    ConsecutiveRoles { position: usize, role: Role },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::EmptyView => write!(f, "no turns to send"),
            Violation::EmptyTurn { position } => write!(f, "turn {position} is empty"),
            Violation::DuplicateInvocation { id, first, second } => {
                write!(f, "tool invocation {id} appears at turns {first} and {second}")
            }
            Violation::DuplicateResult { id, first, second } => {
                write!(f, "tool result {id} appears at turns {first} and {second}")
            }
            Violation::UnmatchedInvocation { id, position } => {
                write!(f, "tool invocation {id} at turn {position} has no result")
            }
            Violation::UnmatchedResult { id, position } => {
                write!(f, "tool result {id} at turn {position} has no invocation")
            }
            Violation::MisplacedInvocation { id, position } => {
                write!(f, "tool invocation {id} at turn {position} is not in an assistant turn")
            }
            Violation::MisplacedResult { id, position } => {
                write!(f, "tool result {id} at turn {position} is not in a user turn")
            }
            Violation::ResultBeforeInvocation {
                id,
                invocation,
                result,
            } => write!(
                f,
                "tool result {id} at turn {result} does not follow its invocation at turn {invocation}"
            ),
            Violation::ResultNotAdjacent {
                id,
                invocation,
                result,
            } => write!(
                f,
                "tool result {id} at turn {result} is not adjacent to its invocation at turn {invocation}"
            ),
            Violation::FirstTurnNotUser { role } => {
                write!(f, "first turn has role {role}, expected user")
            }
            Violation::ConsecutiveRoles { position, role } => {
                write!(f, "turns {} and {position} are both {role}", position - 1)
            }
        }
    }
}

/// A transmission view that must not be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralError {
    pub violations: Vec<Violation>,
}

impl StructuralError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }
}

impl std::fmt::Display for StructuralError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let details: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} protocol violation(s): {}",
            self.violations.len(),
            details.join("; ")
        )
    }
}

impl std::error::Error for StructuralError {}

/// Check a candidate transmission view.
pub fn validate(turns: &[Turn]) -> Result<(), StructuralError> {
    let mut violations = Vec::new();

    if turns.is_empty() {
        return Err(StructuralError::new(vec![Violation::EmptyView]));
    }

    // 1. empty content
    for (position, turn) in turns.iter().enumerate() {
        if turn.content.iter().all(ContentBlock::is_blank) {
            violations.push(Violation::EmptyTurn { position });
        }
    }

    // 2. pairing
    let mut invocations: HashMap<&str, usize> = HashMap::new();
    let mut results: HashMap<&str, usize> = HashMap::new();
    let mut invocation_order: Vec<(&str, usize)> = Vec::new();

    for (position, turn) in turns.iter().enumerate() {
        for block in &turn.content {
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    if let Some(&first) = invocations.get(id.as_str()) {
                        violations.push(Violation::DuplicateInvocation {
                            id: id.clone(),
                            first,
                            second: position,
                        });
                    } else {
                        invocations.insert(id, position);
                        invocation_order.push((id, position));
                    }
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    if let Some(&first) = results.get(tool_use_id.as_str()) {
                        violations.push(Violation::DuplicateResult {
                            id: tool_use_id.clone(),
                            first,
                            second: position,
                        });
                    } else {
                        results.insert(tool_use_id, position);
                    }
                }
                _ => {}
            }
        }
    }

    for &(id, position) in &invocation_order {
        if !results.contains_key(id) {
            violations.push(Violation::UnmatchedInvocation {
                id: id.to_string(),
                position,
            });
        }
    }
    for (position, turn) in turns.iter().enumerate() {
        for id in turn.tool_result_ids() {
            if !invocations.contains_key(id) && results.get(id) == Some(&position) {
                violations.push(Violation::UnmatchedResult {
                    id: id.to_string(),
                    position,
                });
            }
        }
    }

    // 3. placement
    for (position, turn) in turns.iter().enumerate() {
        if turn.role != Role::Assistant {
            for id in turn.tool_use_ids() {
                violations.push(Violation::MisplacedInvocation {
                    id: id.to_string(),
                    position,
                });
            }
        }
        if turn.role != Role::User {
            for id in turn.tool_result_ids() {
                violations.push(Violation::MisplacedResult {
                    id: id.to_string(),
                    position,
                });
            }
        }
    }
    for &(id, invocation) in &invocation_order {
        let Some(&result) = results.get(id) else {
            continue;
        };
        if result <= invocation {
            violations.push(Violation::ResultBeforeInvocation {
                id: id.to_string(),
                invocation,
                result,
            });
        } else if result != invocation + 1 {
            violations.push(Violation::ResultNotAdjacent {
                id: id.to_string(),
                invocation,
                result,
            });
        }
    }

    // 4. alternation
    if turns[0].role != Role::User {
        violations.push(Violation::FirstTurnNotUser {
            role: turns[0].role,
        });
    }
    for position in 1..turns.len() {
        if turns[position].role == turns[position - 1].role {
            violations.push(Violation::ConsecutiveRoles {
                position,
                role: turns[position].role,
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(StructuralError::new(violations))
    }
}
