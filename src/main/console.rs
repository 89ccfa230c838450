// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Mutex;

use chatline::chat::SessionObserver;
use chatline::llm::message::{ConversationTurn, Role, TurnId};
use chatline::llm::models;

/// Prints session turns to stdout as they stream in
#[derive(Default)]
pub(super) struct ConsoleObserver {
    /// Text already written for each streaming assistant turn
    printed: Mutex<HashMap<TurnId, String>>,
}

impl ConsoleObserver {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Write whatever part of the turn's text is not on screen yet.
    fn print_tail(&self, turn: &ConversationTurn) {
        let mut printed = self
            .printed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let shown = printed.entry(turn.id).or_default();

        let mut stdout = io::stdout();
        if let Some(tail) = turn.text.strip_prefix(shown.as_str()) {
            let _ = write!(stdout, "{}", tail);
        } else {
            // replaced rather than extended (fallback or failure text)
            let _ = write!(stdout, "\n{}", turn.text);
        }
        let _ = stdout.flush();
        *shown = turn.text.clone();
    }
}

impl SessionObserver for ConsoleObserver {
    fn on_turn_appended(&self, turn: &ConversationTurn) {
        match turn.role {
            Role::Tool => {
                let name = turn.tool_name.as_deref().unwrap_or("tool");
                println!("[{}] {}", name, turn.text);
            }
            Role::Assistant if turn.is_streaming => {
                let model = turn.model_id.as_deref().unwrap_or_default();
                print!("\n{}: ", models::display_name(model));
                let _ = io::stdout().flush();
            }
            _ => {}
        }
    }

    fn on_turn_updated(&self, turn: &ConversationTurn) {
        if turn.role == Role::Assistant {
            self.print_tail(turn);
        }
    }

    fn on_turn_settled(&self, turn: &ConversationTurn) {
        match turn.role {
            Role::Tool => println!("{}", turn.text),
            Role::Assistant => {
                self.print_tail(turn);
                println!("\n");
                self.printed
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&turn.id);
            }
            _ => {}
        }
    }
}

pub(super) fn print_welcome(greeting: &str, model: &str, search: bool) {
    println!("{}", greeting);
    println!(
        "model: {} | search: {} | /help for commands\n",
        models::display_name(model),
        if search { "on" } else { "off" }
    );
}

pub(super) fn print_models(current: &str) {
    for model in models::catalog() {
        let marker = if model.id == current { "*" } else { " " };
        println!(
            "{} {:<48} {:<30} {}",
            marker, model.id, model.display_name, model.description
        );
    }
    if models::find(current).is_none() {
        println!("* {} (custom)", current);
    }
}

pub(super) fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
