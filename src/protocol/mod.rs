// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Protocol structure rules for transmission views
//!
//! The remote API silently enforces strict structure: alternating roles, a
//! user turn first, and every tool invocation answered by exactly one result
//! in the very next turn. `sanitizer` repairs the common accidental breakages
//! and `validator` refuses anything still illegal before it leaves the process.

pub mod sanitizer;
pub mod validator;

pub use sanitizer::{
    sanitize, sanitize_with_report, RepairReport, ASSISTANT_PLACEHOLDER, SYNTHETIC_USER_TEXT,
    USER_PLACEHOLDER,
};
pub use validator::{validate, StructuralError, Violation};
