// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for chatline.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::chat::locale::Language;
use crate::llm::provider::ProviderKind;

/// Chatline - streaming AI chat for your terminal
#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(version, about = "Streaming AI chat for your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path (defaults to ~/.chatline/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Display language (zh, en)
    #[arg(short, long, global = true)]
    pub lang: Option<Language>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start interactive chat session (default when no command given)
    Chat(ChatArgs),

    /// Ask a single question (non-interactive)
    Ask(AskArgs),

    /// List the curated models
    Models,

    /// Show today's news digest
    Digest(DigestArgs),
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// LLM provider to use (openrouter, groq)
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Search the web before each answer
    #[arg(short, long)]
    pub search: bool,

    /// Custom system prompt
    #[arg(long)]
    pub system: Option<String>,
}

/// Arguments for the ask subcommand
#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    pub prompt: String,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// LLM provider to use (openrouter, groq)
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Search the web before answering
    #[arg(short, long)]
    pub search: bool,

    /// Custom system prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Wait for the full answer instead of streaming it
    #[arg(long)]
    pub no_stream: bool,
}

/// Arguments for the digest subcommand
#[derive(clap::Args, Debug, Default)]
pub struct DigestArgs {
    /// Regenerate even if a fresh digest is cached
    #[arg(short, long)]
    pub force: bool,
}

/// Output format for non-interactive commands
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Text,

    /// JSON output
    Json,
}
