// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use clap::Parser;
use colloquy::cli::{Cli, Commands, OutputFormat};
use std::path::PathBuf;

#[test]
fn test_parse_validate_command() {
    let args = vec!["colloquy", "validate", "history.jsonl"];
    let cli = Cli::try_parse_from(args).expect("Valid command parsing");
    if let Commands::Validate(file_args) = cli.command {
        assert_eq!(file_args.file, PathBuf::from("history.jsonl"));
    } else {
        panic!("Expected Validate command");
    }
}

#[test]
fn test_parse_sanitize_defaults_to_dry_run() {
    let args = vec!["colloquy", "sanitize", "history.jsonl"];
    let cli = Cli::try_parse_from(args).expect("Valid command parsing");
    if let Commands::Sanitize(sanitize_args) = cli.command {
        assert!(!sanitize_args.write);
    } else {
        panic!("Expected Sanitize command");
    }
}

#[test]
fn test_parse_sanitize_write() {
    let args = vec!["colloquy", "sanitize", "--write", "history.jsonl"];
    let cli = Cli::try_parse_from(args).expect("Valid command parsing");
    assert!(matches!(cli.command, Commands::Sanitize(ref a) if a.write));
}

#[test]
fn test_parse_estimate_with_config() {
    let args = vec![
        "colloquy",
        "--config",
        "settings.json",
        "estimate",
        "history.jsonl",
    ];
    let cli = Cli::try_parse_from(args).expect("Valid command parsing");
    assert_eq!(cli.config, Some(PathBuf::from("settings.json")));
    assert!(matches!(cli.command, Commands::Estimate(_)));
}

#[test]
fn test_parse_json_format() {
    let args = vec!["colloquy", "validate", "h.jsonl", "--format", "json"];
    let cli = Cli::try_parse_from(args).expect("Valid command parsing");
    assert_eq!(cli.format, OutputFormat::Json);
}

#[test]
fn test_invalid_format_rejected() {
    let args = vec!["colloquy", "validate", "h.jsonl", "--format", "yaml"];
    assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn test_missing_file_argument_rejected() {
    assert!(Cli::try_parse_from(vec!["colloquy", "validate"]).is_err());
}

#[test]
fn test_unknown_subcommand_rejected() {
    assert!(Cli::try_parse_from(vec!["colloquy", "chat"]).is_err());
}
