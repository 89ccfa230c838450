// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request composition
//!
//! Turns a session's log plus the pending user input into the message list
//! sent to the provider. The result always satisfies:
//!
//! - exactly one system message, and it comes first
//! - no message has empty content
//! - at least one user message

use serde::Serialize;

use crate::llm::message::{ChatMessage, ConversationTurn, Role, TurnId};

/// Substituted for empty message content
pub const BLANK_CONTENT: &str = " ";
/// Name given to tool output that arrives without one
pub const UNKNOWN_TOOL: &str = "unknown_tool";
/// Inserted when a message list would otherwise carry no user message
pub const FILLER_USER_PROMPT: &str = "Please answer my question.";
/// Sole user message for an otherwise empty message list
pub const EMPTY_CONVERSATION_PROMPT: &str = "Hello";

/// Output of a tool call, fed back to the model as a `tool` message
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_name: Option<String>,
    pub content: String,
}

impl ToolResult {
    pub fn new(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            content: content.into(),
        }
    }
}

/// Sampling parameters carried alongside the messages
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl RequestParams {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            temperature: 0.7,
            max_tokens: 2000,
            stream: true,
        }
    }
}

/// A chat-completion request body: `{model, messages, temperature, max_tokens, stream}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedRequest {
    #[serde(rename = "model")]
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ComposedRequest {
    /// One system prompt and one user prompt, no history
    pub fn single_turn(system_prompt: &str, user_prompt: &str, params: &RequestParams) -> Self {
        Self {
            model_id: params.model_id.clone(),
            messages: normalize(vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_prompt),
            ]),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: params.stream,
        }
    }

    /// Same request with streaming switched on or off
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

fn non_blank(content: &str) -> String {
    if content.trim().is_empty() {
        BLANK_CONTENT.to_string()
    } else {
        content.to_string()
    }
}

/// Build the request for a new user submission.
///
/// `history` is the log as it stood before this submission. Turns with the
/// `placeholder` id and system turns are skipped; of the rest only the last
/// `context_window` are kept. The user input follows, then any tool
/// results.
pub fn compose(
    user_input: &str,
    history: &[ConversationTurn],
    placeholder: Option<&TurnId>,
    system_prompt: &str,
    tool_results: &[ToolResult],
    context_window: usize,
    params: &RequestParams,
) -> ComposedRequest {
    let context_window = context_window.max(1);

    let eligible: Vec<&ConversationTurn> = history
        .iter()
        .filter(|turn| placeholder != Some(&turn.id))
        .filter(|turn| turn.role != Role::System)
        .collect();
    let skip = eligible.len().saturating_sub(context_window);

    let mut messages = Vec::with_capacity(context_window + tool_results.len() + 2);
    messages.push(ChatMessage::system(non_blank(system_prompt)));

    for turn in eligible.into_iter().skip(skip) {
        let message = match turn.role {
            Role::Tool => ChatMessage::tool(
                turn.tool_name.as_deref().unwrap_or(UNKNOWN_TOOL),
                non_blank(&turn.text),
            ),
            role => ChatMessage::new(role, non_blank(&turn.text)),
        };
        messages.push(message);
    }

    messages.push(ChatMessage::user(non_blank(user_input)));

    for result in tool_results {
        messages.push(ChatMessage::tool(
            result.tool_name.as_deref().unwrap_or(UNKNOWN_TOOL),
            non_blank(&result.content),
        ));
    }

    tracing::debug!(
        target: "chatline.compose",
        model = %params.model_id,
        messages = messages.len(),
        history = history.len(),
        tool_results = tool_results.len(),
        "composed request"
    );

    ComposedRequest {
        model_id: params.model_id.clone(),
        messages,
        temperature: params.temperature,
        max_tokens: params.max_tokens,
        stream: params.stream,
    }
}

/// Repair a caller-supplied message list so it meets the request invariants.
///
/// The first system message is kept and moved to the front (an empty one is
/// added when none exists); later system messages become user messages.
/// Tool messages without a name get `unknown_tool`. A filler user message is
/// appended when no user message remains; an empty list becomes a plain
/// `Hello`.
pub fn normalize(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if messages.is_empty() {
        return vec![
            ChatMessage::system(BLANK_CONTENT),
            ChatMessage::user(EMPTY_CONVERSATION_PROMPT),
        ];
    }

    let mut system: Option<ChatMessage> = None;
    let mut rest = Vec::with_capacity(messages.len());

    for mut message in messages {
        message.content = non_blank(&message.content);
        match message.role {
            Role::System if system.is_none() => system = Some(message),
            Role::System => {
                message.role = Role::User;
                rest.push(message);
            }
            Role::Tool => {
                if message.tool_name.is_none() {
                    message.tool_name = Some(UNKNOWN_TOOL.to_string());
                }
                rest.push(message);
            }
            _ => {
                message.tool_name = None;
                rest.push(message);
            }
        }
    }

    if !rest.iter().any(|m| m.role == Role::User) {
        rest.push(ChatMessage::user(FILLER_USER_PROMPT));
    }

    let mut normalized = Vec::with_capacity(rest.len() + 1);
    normalized.push(system.unwrap_or_else(|| ChatMessage::system(BLANK_CONTENT)));
    normalized.extend(rest);
    normalized
}
