// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable conversation history
//!
//! The store is the single source of truth for a conversation's turns. It is
//! append-mostly and unbounded; the transmission view sent to the model is
//! derived from it on every round and never written back.

pub mod store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use store::{read_or_empty, HistoryStore, JsonlHistoryStore, MemoryHistoryStore};

/// Identity of one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Generate a new random conversation id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
