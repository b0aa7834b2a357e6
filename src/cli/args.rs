// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for Colloquy.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Colloquy - conversation history tooling
#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(version, about = "Inspect and repair conversation histories")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a JSONL history against the protocol rules
    Validate(HistoryFileArgs),

    /// Repair a JSONL history
    Sanitize(SanitizeArgs),

    /// Weigh a JSONL history against the window budget
    Estimate(HistoryFileArgs),
}

/// A history file argument
#[derive(Args, Debug, Clone)]
pub struct HistoryFileArgs {
    /// Path to the JSONL history file
    pub file: PathBuf,
}

/// Arguments for sanitize
#[derive(Args, Debug, Clone)]
pub struct SanitizeArgs {
    /// Path to the JSONL history file
    pub file: PathBuf,

    /// Write the repaired history back to the file
    #[arg(long)]
    pub write: bool,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
