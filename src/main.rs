// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chatline - streaming AI chat for your terminal
//!
//! Entry point for the chatline CLI application.

use clap::Parser;

use chatline::cli::{ChatArgs, Cli, Commands};
use chatline::config::Settings;
use chatline::error::Result;

#[path = "main/cli_commands.rs"]
mod cli_commands;
#[path = "main/console.rs"]
mod console;

use cli_commands::{run_ask, run_chat, run_digest, run_models};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on session diagnostics, `-vv` everything chatline logs.
    // `RUST_LOG` still takes precedence.
    let directives: &[&str] = match cli.verbose {
        0 => &[],
        1 => &[
            "chatline.session=debug",
            "chatline.dispatch=debug",
            "chatline.stream=debug",
        ],
        _ => &["chatline=trace"],
    };
    for directive in directives {
        if let Ok(parsed) = directive.parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    // Load settings
    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load_from(&config_path)?;
    if let Some(lang) = cli.lang {
        settings.chat.language = lang;
    }

    match cli.command {
        None => run_chat(ChatArgs::default(), settings, &config_path).await,
        Some(Commands::Chat(args)) => run_chat(args, settings, &config_path).await,
        Some(Commands::Ask(args)) => run_ask(args, settings, cli.format).await,
        Some(Commands::Models) => run_models(&settings, cli.format),
        Some(Commands::Digest(args)) => run_digest(args, settings, cli.format).await,
    }
}
