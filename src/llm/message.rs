// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for chat sessions
//!
//! `ConversationTurn` is what a session stores and shows; `ChatMessage` is
//! what goes over the wire to a chat-completion endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a turn, unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a message sender
///
/// Deserialization is lenient: unrecognized role tags become `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    /// Parse a role tag, defaulting unknown tags to `User`.
    pub fn parse_lenient(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            other => {
                tracing::debug!(target: "chatline.compose", role = other, "unknown role tag, using user");
                Role::User
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl From<String> for Role {
    fn from(tag: String) -> Self {
        Role::parse_lenient(&tag)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a session's log
///
/// Text is appended in place while `is_streaming` is set; once cleared the
/// turn is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub is_streaming: bool,
    /// Model that produced (or is producing) an assistant turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    fn with_role(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            text: text.into(),
            tool_name: None,
            is_streaming: false,
            model_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, text)
    }

    /// A finished tool turn
    pub fn tool(tool_name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut turn = Self::with_role(Role::Tool, text);
        turn.tool_name = Some(tool_name.into());
        turn
    }

    /// Empty assistant turn that a streamed response fills in
    pub fn placeholder(model_id: impl Into<String>) -> Self {
        let mut turn = Self::with_role(Role::Assistant, String::new());
        turn.is_streaming = true;
        turn.model_id = Some(model_id.into());
        turn
    }

    /// Tool turn shown while the tool call is running
    pub fn pending_tool(tool_name: impl Into<String>, notice: impl Into<String>) -> Self {
        let mut turn = Self::tool(tool_name, notice);
        turn.is_streaming = true;
        turn
    }
}

/// Provider-agnostic wire message: `{role, content, name?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool name, only set on `tool` messages
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_lenient() {
        assert_eq!(Role::parse_lenient("user"), Role::User);
        assert_eq!(Role::parse_lenient("Assistant"), Role::Assistant);
        assert_eq!(Role::parse_lenient(" system "), Role::System);
        assert_eq!(Role::parse_lenient("tool"), Role::Tool);
        assert_eq!(Role::parse_lenient("function"), Role::User);
        assert_eq!(Role::parse_lenient(""), Role::User);
    }

    #[test]
    fn test_role_deserialize_unknown_defaults_to_user() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role": "developer", "content": "hi"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_chat_message_name_only_on_tool() {
        let user = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert!(user.get("name").is_none());

        let tool = serde_json::to_value(ChatMessage::tool("tavily_search", "results")).unwrap();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["name"], "tavily_search");
    }

    #[test]
    fn test_placeholder_turn() {
        let turn = ConversationTurn::placeholder("openai/gpt-4o");
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.is_streaming);
        assert!(turn.text.is_empty());
        assert_eq!(turn.model_id.as_deref(), Some("openai/gpt-4o"));
    }

    #[test]
    fn test_turn_ids_unique() {
        let a = ConversationTurn::user("a");
        let b = ConversationTurn::user("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_pending_tool_turn() {
        let turn = ConversationTurn::pending_tool("tavily_search", "Searching...");
        assert_eq!(turn.role, Role::Tool);
        assert!(turn.is_streaming);
        assert_eq!(turn.tool_name.as_deref(), Some("tavily_search"));
    }
}
