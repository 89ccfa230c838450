// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for chatline
//!
//! Handles command-line argument parsing and interactive slash commands.

pub mod args;
pub mod repl;

pub use args::*;
pub use repl::{ReplCommand, HELP_TEXT};
