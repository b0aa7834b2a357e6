// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for Colloquy
//!
//! Conversation content model, transport abstraction, and payload helpers.

pub mod json;
pub mod message;
pub mod mock_provider;
pub mod provider;

pub use message::*;
pub use provider::*;
