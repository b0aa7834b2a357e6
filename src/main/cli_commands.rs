// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Subcommand handlers. Each returns whether the history passed.

use serde::Serialize;

use colloquy::cli::{HistoryFileArgs, OutputFormat, SanitizeArgs};
use colloquy::commands::{estimate_history, sanitize_history, validate_history};
use colloquy::config::Settings;
use colloquy::error::Result;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) async fn run_validate(args: &HistoryFileArgs, format: OutputFormat) -> Result<bool> {
    let report = validate_history(&args.file).await?;

    if format == OutputFormat::Json {
        print_json(&report)?;
        return Ok(report.is_valid());
    }

    if report.is_valid() {
        println!("{}: {} turns, valid", report.path.display(), report.turns);
    } else {
        println!(
            "{}: {} turns, {} violation(s)",
            report.path.display(),
            report.turns,
            report.violations.len()
        );
        for violation in &report.violations {
            println!("  - {violation}");
        }
    }
    Ok(report.is_valid())
}

pub(crate) async fn run_sanitize(args: &SanitizeArgs, format: OutputFormat) -> Result<bool> {
    let report = sanitize_history(&args.file, args.write).await?;
    let valid = report.remaining_violations.is_empty();

    if format == OutputFormat::Json {
        print_json(&report)?;
        return Ok(valid);
    }

    let repairs = &report.repairs;
    println!(
        "{}: {} -> {} turns",
        report.path.display(),
        report.turns_before,
        report.turns_after
    );
    if repairs.is_clean() {
        println!("  nothing to repair");
    } else {
        for (label, count) in [
            ("blank blocks removed", repairs.blank_blocks_removed),
            ("empty turns removed", repairs.empty_turns_removed),
            ("duplicate turns removed", repairs.duplicate_turns_removed),
            ("turns merged", repairs.turns_merged),
            ("orphan invocations removed", repairs.orphan_invocations_removed),
            ("orphan results removed", repairs.orphan_results_removed),
            ("placeholders inserted", repairs.placeholders_inserted),
        ] {
            if count > 0 {
                println!("  {label}: {count}");
            }
        }
        if repairs.synthetic_user_prepended {
            println!("  synthetic user turn prepended");
        }
        if report.written {
            println!("  written back");
        } else {
            println!("  dry run (pass --write to save)");
        }
    }
    for violation in &report.remaining_violations {
        println!("  still invalid: {violation}");
    }
    Ok(valid)
}

pub(crate) async fn run_estimate(
    args: &HistoryFileArgs,
    settings: &Settings,
    format: OutputFormat,
) -> Result<bool> {
    let report = estimate_history(&args.file, &settings.window).await?;

    if format == OutputFormat::Json {
        print_json(&report)?;
        return Ok(true);
    }

    println!("{}: {} turns", report.path.display(), report.turns);
    println!(
        "  weighted size: {} / {} units",
        report.weighted_units, report.budget_units
    );
    println!("  tool blocks: {}", if report.has_tool_blocks { "yes" } else { "no" });
    if report.would_compress {
        println!(
            "  would condense all but the last {} turns",
            report.recent_turns
        );
    }
    Ok(true)
}
