// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context window handling
//!
//! Size estimation for turns and the window manager that keeps the
//! transmission view inside its budget.

pub mod estimate;
pub mod window;

pub use estimate::{estimate_block, estimate_turn, estimate_turns};
pub use window::{
    needs_compression, pair_safe_split, placeholder_summary, TransmissionView, WindowManager,
};
