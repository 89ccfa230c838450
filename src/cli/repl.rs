// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Slash commands understood by the interactive chat

/// A parsed `/command` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// `/quit`, `/exit`
    Quit,
    /// `/clear`: reset the session to the greeting
    Clear,
    /// `/help`
    Help,
    /// `/model` lists models, `/model <id>` switches
    Model(Option<String>),
    /// `/search` shows the state, `/search on|off` toggles
    Search(Option<bool>),
    /// `/system <prompt>` sets, `/system` alone restores the default
    System(Option<String>),
    /// Anything else starting with `/`
    Unknown(String),
}

impl ReplCommand {
    /// Parse a line; None when it is a message rather than a command.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => ReplCommand::Quit,
            "clear" | "reset" => ReplCommand::Clear,
            "help" | "?" => ReplCommand::Help,
            "model" | "models" => ReplCommand::Model(arg.map(str::to_string)),
            "search" => match arg.map(|a| a.to_ascii_lowercase()) {
                None => ReplCommand::Search(None),
                Some(a) if matches!(a.as_str(), "on" | "true" | "yes" | "1") => {
                    ReplCommand::Search(Some(true))
                }
                Some(a) if matches!(a.as_str(), "off" | "false" | "no" | "0") => {
                    ReplCommand::Search(Some(false))
                }
                Some(_) => ReplCommand::Unknown(line.to_string()),
            },
            "system" => ReplCommand::System(arg.map(str::to_string)),
            _ => ReplCommand::Unknown(line.to_string()),
        };
        Some(command)
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /model [id]        list models, or switch to <id>
  /search [on|off]   show or toggle web search before answers
  /system [prompt]   set the system prompt, or restore the default
  /clear             start over
  /quit              leave
Press Ctrl-C while an answer is streaming to stop it.";
