// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! History maintenance commands
//!
//! Offline checks over a JSONL conversation log: protocol validation,
//! repair, and window size estimation. The CLI prints the reports.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::WindowConfig;
use crate::context::{estimate_turns, needs_compression};
use crate::error::{ColloquyError, Result};
use crate::history::{HistoryStore, JsonlHistoryStore};
use crate::llm::message::Turn;
use crate::protocol::{sanitize_with_report, validate, RepairReport};

/// Outcome of `validate`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub turns: usize,
    pub violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Outcome of `sanitize`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizeReport {
    pub path: PathBuf,
    pub turns_before: usize,
    pub turns_after: usize,
    pub repairs: RepairReport,
    /// Violations left after repair
    pub remaining_violations: Vec<String>,
    pub written: bool,
    #[serde(skip)]
    pub turns: Vec<Turn>,
}

/// Outcome of `estimate`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateReport {
    pub path: PathBuf,
    pub turns: usize,
    pub weighted_units: usize,
    pub budget_units: usize,
    pub recent_turns: usize,
    pub has_tool_blocks: bool,
    pub would_compress: bool,
}

async fn load(path: &Path) -> Result<(JsonlHistoryStore, Vec<Turn>)> {
    if !path.is_file() {
        return Err(ColloquyError::InvalidInput(format!(
            "no history file at {}",
            path.display()
        )));
    }
    let store = JsonlHistoryStore::from_path(path);
    let turns = store.read().await?;
    Ok((store, turns))
}

fn violations_of(turns: &[Turn]) -> Vec<String> {
    match validate(turns) {
        Ok(()) => Vec::new(),
        Err(error) => error.violations.iter().map(ToString::to_string).collect(),
    }
}

/// Check a stored log against the protocol rules.
pub async fn validate_history(path: &Path) -> Result<ValidationReport> {
    let (_, turns) = load(path).await?;
    Ok(ValidationReport {
        path: path.to_path_buf(),
        turns: turns.len(),
        violations: violations_of(&turns),
    })
}

/// Repair a stored log, writing it back when `write` is set.
pub async fn sanitize_history(path: &Path, write: bool) -> Result<SanitizeReport> {
    let (store, turns) = load(path).await?;
    let (repaired, repairs) = sanitize_with_report(&turns);
    let remaining_violations = violations_of(&repaired);

    let written = write && !repairs.is_clean();
    if written {
        store.replace_all(repaired.clone()).await?;
        tracing::info!(
            target: "colloquy.commands",
            path = %path.display(),
            ?repairs,
            "rewrote history file"
        );
    }

    Ok(SanitizeReport {
        path: path.to_path_buf(),
        turns_before: turns.len(),
        turns_after: repaired.len(),
        repairs,
        remaining_violations,
        written,
        turns: repaired,
    })
}

/// Weigh a stored log against the window budget.
pub async fn estimate_history(path: &Path, config: &WindowConfig) -> Result<EstimateReport> {
    let (_, turns) = load(path).await?;
    Ok(EstimateReport {
        path: path.to_path_buf(),
        turns: turns.len(),
        weighted_units: estimate_turns(&turns, config),
        budget_units: config.budget_units,
        recent_turns: config.recent_turns,
        has_tool_blocks: turns.iter().any(Turn::has_tool_blocks),
        would_compress: needs_compression(&turns, config),
    })
}
