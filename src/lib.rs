// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Colloquy - conversation state and tool-invocation orchestration for
//! turn-based chat-completion protocols.
//!
//! Architecture highlights:
//! - `llm`: turn/content-block model and the streaming provider abstraction
//! - `history`: durable append-only turn log per conversation
//! - `protocol`: structure validation and repair of transmission views
//! - `context`: size estimation, windowing, and summary compaction
//! - `chat`: the tool-invocation cycle, submission guard, and session flow
//! - `tools`: tool executor seam and registry
//! - `commands`, `cli`: offline history maintenance from the command line

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod llm;
pub mod protocol;
pub mod tools;

pub use error::{ColloquyError, Result};
