// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{ColloquyError, Result};

use super::Settings;

impl Settings {
    /// Reject values the window manager or loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.window.recent_turns == 0 {
            return Err(ColloquyError::Config(
                "window.recent_turns must be at least 1".to_string(),
            ));
        }
        if self.window.chars_per_unit == 0 {
            return Err(ColloquyError::Config(
                "window.chars_per_unit must be at least 1".to_string(),
            ));
        }
        if self.window.budget_units == 0 {
            return Err(ColloquyError::Config(
                "window.budget_units must be positive".to_string(),
            ));
        }
        if self.tool_loop.max_tool_rounds == 0 {
            return Err(ColloquyError::Config(
                "tool_loop.max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.tool_loop.stream_idle_timeout_ms == 0 {
            return Err(ColloquyError::Config(
                "tool_loop.stream_idle_timeout_ms must be positive".to_string(),
            ));
        }
        if self.tool_loop.model.trim().is_empty() {
            return Err(ColloquyError::Config(
                "tool_loop.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let mut settings = Settings::default();
        settings.tool_loop.max_tool_rounds = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_tool_rounds"));
    }

    #[test]
    fn test_empty_model_rejected() {
        let mut settings = Settings::default();
        settings.tool_loop.model = "  ".to_string();
        assert!(settings.validate().is_err());
    }
}
