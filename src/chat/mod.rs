// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation orchestration
//!
//! `engine` runs the tool-invocation cycle, `guard` keeps one cycle in flight
//! per conversation, and `session` ties both to a conversation id and its
//! UI-visible transcript.

pub mod engine;
pub mod guard;
pub mod session;
pub mod streaming;
pub mod title;

pub use engine::{CycleObserver, CycleOutcome, NoopCycleObserver, Orchestrator};
pub use guard::{DedupGuard, FlightPermit, GuardRegistry};
pub use session::{ChatSession, ChatSessionBuilder, TranscriptEntry};
pub use streaming::{AccumulatedResponse, StreamAccumulator, ToolCall};
pub use title::generate_title;
