// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use chatline::chat::{compose, ChatSession, ChatSessionBuilder, RequestParams, SubmitOutcome, ToolResult};
use chatline::cli::{AskArgs, ChatArgs, DigestArgs, OutputFormat, ReplCommand, HELP_TEXT};
use chatline::config::Settings;
use chatline::digest::{unavailable_notice, DigestService};
use chatline::error::{ChatError, Result};
use chatline::llm::message::Role;
use chatline::llm::models;
use chatline::llm::{Dispatcher, ProviderEndpoint, ProviderKind, RetryPolicy};
use chatline::tools::search::{failure_notice, format_results, TavilyClient, WebSearch};

use super::console::{print_models, print_welcome, prompt, ConsoleObserver};

/// Fold per-command flags into the loaded settings
fn apply_overrides(
    settings: &mut Settings,
    provider: Option<ProviderKind>,
    model: Option<String>,
    search: bool,
    system: Option<String>,
) {
    if let Some(provider) = provider {
        settings.chat.provider = provider;
    }
    if model.is_some() {
        settings.chat.model = model;
    }
    if search {
        settings.chat.search_enabled = true;
    }
    if system.is_some() {
        settings.chat.system_prompt = system;
    }
}

/// Write a REPL choice back to the settings file so the next session starts with it
fn remember(config_path: &Path, change: impl FnOnce(&mut Settings)) {
    if let Err(e) = Settings::update_at(config_path, change) {
        tracing::warn!(target: "chatline.session", error = %e, path = %config_path.display(), "could not save settings");
        eprintln!("warning: could not save settings: {}", e);
    }
}

/// Run one submission, cancelling it on Ctrl-C.
async fn submit_interruptible(session: &ChatSession, input: &str) -> Option<SubmitOutcome> {
    let worker = session.clone();
    let input = input.to_string();
    let mut handle = tokio::spawn(async move { worker.submit(&input).await });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            session.cancel();
            handle.await
        }
    };

    match joined {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!(target: "chatline.session", error = %e, "submit task failed");
            None
        }
    }
}

/// Run interactive chat mode
pub(super) async fn run_chat(args: ChatArgs, mut settings: Settings, config_path: &Path) -> Result<()> {
    apply_overrides(&mut settings, args.provider, args.model, args.search, args.system);
    let language = settings.chat.language;

    let session = ChatSessionBuilder::from_settings(&settings)?
        .with_observer(Arc::new(ConsoleObserver::new()))
        .build();

    print_welcome(language.greeting(), &session.model(), session.search_enabled());
    if session.search_enabled() && !session.search_available() {
        eprintln!(
            "Web search is on but no Tavily key is configured (set {}).",
            settings.search.tavily.api_key_env
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ReplCommand::parse(&line) {
            Some(ReplCommand::Quit) => break,
            Some(ReplCommand::Clear) => {
                session.reset();
                print_welcome(language.greeting(), &session.model(), session.search_enabled());
            }
            Some(ReplCommand::Help) => println!("{}", HELP_TEXT),
            Some(ReplCommand::Model(None)) => print_models(&session.model()),
            Some(ReplCommand::Model(Some(id))) => {
                println!("Switched to {}", models::display_name(&id));
                remember(config_path, |s| s.chat.model = Some(id.clone()));
                session.set_model(id);
            }
            Some(ReplCommand::Search(None)) => {
                println!("search: {}", if session.search_enabled() { "on" } else { "off" });
            }
            Some(ReplCommand::Search(Some(enabled))) => {
                session.set_search_enabled(enabled);
                remember(config_path, |s| s.chat.search_enabled = enabled);
                if enabled && !session.search_available() {
                    eprintln!(
                        "No Tavily key configured (set {}); answers will not include search results.",
                        settings.search.tavily.api_key_env
                    );
                }
                println!("search: {}", if enabled { "on" } else { "off" });
            }
            Some(ReplCommand::System(text)) => {
                println!(
                    "{}",
                    if text.is_some() { "System prompt set." } else { "System prompt reset." }
                );
                session.set_system_prompt(text);
            }
            Some(ReplCommand::Unknown(command)) => {
                println!("Unknown command: {} (try /help)", command);
            }
            None if line.trim().is_empty() => continue,
            None => match submit_interruptible(&session, &line).await {
                Some(SubmitOutcome::Cancelled) => println!("[stopped]\n"),
                Some(SubmitOutcome::Failed { error, .. }) => eprintln!("error: {}\n", error),
                _ => {}
            },
        }
    }

    session.cancel();
    Ok(())
}

/// Ask a single question
pub(super) async fn run_ask(args: AskArgs, mut settings: Settings, format: OutputFormat) -> Result<()> {
    apply_overrides(&mut settings, args.provider, args.model, args.search, args.system);

    if args.no_stream {
        return run_ask_blocking(&args.prompt, &settings, format).await;
    }

    let builder = ChatSessionBuilder::from_settings(&settings)?;
    let session = match format {
        OutputFormat::Text => builder.with_observer(Arc::new(ConsoleObserver::new())).build(),
        OutputFormat::Json => builder.build(),
    };

    let outcome = submit_interruptible(&session, &args.prompt).await;
    match outcome {
        Some(SubmitOutcome::Failed { error, .. }) => Err(ChatError::Session(error)),
        Some(SubmitOutcome::Cancelled) | None => Err(ChatError::Cancelled),
        Some(SubmitOutcome::Ignored) => Err(ChatError::InvalidInput("empty prompt".to_string())),
        Some(SubmitOutcome::Completed { turn_id, .. }) => {
            if format == OutputFormat::Json {
                let turns = session.turns();
                let answer = turns.iter().find(|t| t.id == turn_id);
                let search = turns.iter().find(|t| t.role == Role::Tool).map(|t| t.text.clone());
                let json = serde_json::json!({
                    "model": answer.and_then(|t| t.model_id.clone()),
                    "text": answer.map(|t| t.text.clone()),
                    "search": search,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            Ok(())
        }
    }
}

async fn run_ask_blocking(prompt_text: &str, settings: &Settings, format: OutputFormat) -> Result<()> {
    let language = settings.chat.language;
    let endpoint = ProviderEndpoint::from_settings(settings, settings.chat.provider)?;
    let dispatcher = Dispatcher::new(endpoint, RetryPolicy::from(&settings.resilience));
    let cancel = CancellationToken::new();

    let mut system_prompt = settings
        .chat
        .system_prompt
        .clone()
        .unwrap_or_else(|| language.default_system_prompt().to_string());
    let mut tool_results = Vec::new();
    if settings.chat.search_enabled {
        match TavilyClient::from_settings(settings)? {
            Some(tavily) => match tavily.search(&tavily.request(prompt_text)).await {
                Ok(response) => {
                    tool_results.push(ToolResult::new(tavily.name(), format_results(&response, language)));
                    system_prompt.push_str(language.search_instruction());
                }
                Err(e) => {
                    tracing::warn!(target: "chatline.search", error = %e, "search failed, passing the notice to the model");
                    let notice = failure_notice(&e, language);
                    eprintln!("{}", notice);
                    tool_results.push(ToolResult::new(tavily.name(), notice));
                    system_prompt.push_str(language.search_instruction());
                }
            },
            None => eprintln!(
                "No Tavily key configured (set {}); answering without search.",
                settings.search.tavily.api_key_env
            ),
        }
    }

    let params = RequestParams {
        model_id: settings.chat_model(),
        temperature: settings.chat.temperature,
        max_tokens: settings.chat.max_tokens,
        stream: false,
    };
    let request = compose(
        prompt_text,
        &[],
        None,
        &system_prompt,
        &tool_results,
        settings.chat.context_window,
        &params,
    );

    let completion = tokio::select! {
        completion = dispatcher.complete(&request, &cancel) => completion?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            return Err(ChatError::Cancelled);
        }
    };

    match format {
        OutputFormat::Text => println!("{}", completion.text),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "model": completion.model_id,
                "text": completion.text,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

/// List the curated models
pub(super) fn run_models(settings: &Settings, format: OutputFormat) -> Result<()> {
    let current = settings.chat_model();
    match format {
        OutputFormat::Text => print_models(&current),
        OutputFormat::Json => {
            let list: Vec<_> = models::catalog()
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "id": m.id,
                        "name": m.display_name,
                        "provider": m.provider,
                        "description": m.description,
                        "current": m.id == current,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }
    Ok(())
}

/// Show the daily digest
pub(super) async fn run_digest(args: DigestArgs, settings: Settings, format: OutputFormat) -> Result<()> {
    let language = settings.chat.language;
    let service = DigestService::from_settings(&settings)?;

    let report = match service.daily(language, args.force).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(target: "chatline.digest", error = %e, "digest unavailable");
            eprintln!("error: {}", e);
            println!("{}", unavailable_notice(language));
            return Ok(());
        }
    };

    match format {
        OutputFormat::Text => {
            if report.stale {
                eprintln!("Could not refresh the digest; showing the last one.");
            }
            println!("{}", report.digest.summary);
            let mut notes = vec![
                report.digest.date.clone(),
                format!("{} stories", report.digest.news_count),
            ];
            if report.from_cache {
                notes.push("cached".to_string());
            }
            if report.digest.is_backup {
                notes.push("short form".to_string());
            }
            println!("\n({})", notes.join(", "));
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "summary": report.digest.summary,
                "date": report.digest.date,
                "newsCount": report.digest.news_count,
                "fromCache": report.from_cache,
                "isBackup": report.digest.is_backup,
                "stale": report.stale,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}
