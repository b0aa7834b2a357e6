// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Colloquy - conversation history tooling
//!
//! Entry point for the Colloquy CLI application.

use clap::Parser;

use colloquy::cli::{Cli, Commands};
use colloquy::config::Settings;
use colloquy::error::Result;

#[path = "main/cli_commands.rs"]
mod cli_commands;

use cli_commands::{run_estimate, run_sanitize, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the engine and store diagnostics. `RUST_LOG` still takes precedence.
    if cli.verbose > 0 {
        for directive in [
            "colloquy.chat.engine=debug",
            "colloquy.context.window=debug",
            "colloquy.protocol.sanitizer=debug",
            "colloquy.history.store=debug",
            "colloquy.commands=debug",
        ] {
            if let Ok(parsed) = directive.parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    let valid = match cli.command {
        Commands::Validate(args) => run_validate(&args, cli.format).await?,
        Commands::Sanitize(args) => run_sanitize(&args, cli.format).await?,
        Commands::Estimate(args) => run_estimate(&args, &settings, cli.format).await?,
    };

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}
