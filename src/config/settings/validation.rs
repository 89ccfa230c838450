// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{ChatError, Result};
use crate::llm::provider::ProviderKind;

use super::Settings;

/// Env var wins over a key stored in the settings file.
fn resolve_key(env_name: &str, stored: Option<&String>) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| stored.cloned())
}

impl Settings {
    /// Get the API key for OpenRouter, checking env var first.
    pub fn get_openrouter_api_key(&self) -> Option<String> {
        let config = &self.providers.openrouter;
        resolve_key(&config.api_key_env, config.api_key.as_ref())
    }

    /// Get the API key for Groq, checking env var first.
    pub fn get_groq_api_key(&self) -> Option<String> {
        let config = &self.providers.groq;
        resolve_key(&config.api_key_env, config.api_key.as_ref())
    }

    /// Get the API key for Tavily, checking env var first.
    pub fn get_tavily_api_key(&self) -> Option<String> {
        let config = &self.search.tavily;
        resolve_key(&config.api_key_env, config.api_key.as_ref())
    }

    /// API key for whichever provider is selected for chat.
    pub fn chat_api_key(&self) -> Option<String> {
        match self.chat.provider {
            ProviderKind::OpenRouter => self.get_openrouter_api_key(),
            ProviderKind::Groq => self.get_groq_api_key(),
        }
    }

    /// Model used for chat: explicit override, else the provider default.
    pub fn chat_model(&self) -> String {
        if let Some(model) = &self.chat.model {
            return model.clone();
        }
        match self.chat.provider {
            ProviderKind::OpenRouter => self.providers.openrouter.default_model.clone(),
            ProviderKind::Groq => self.providers.groq.default_model.clone(),
        }
    }

    /// Reject values the session cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chat.context_window == 0 {
            return Err(ChatError::Config(
                "chat.context_window must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ChatError::Config(format!(
                "chat.temperature must be between 0 and 2, got {}",
                self.chat.temperature
            )));
        }
        if self.chat.max_tokens == 0 {
            return Err(ChatError::Config(
                "chat.max_tokens must be positive".to_string(),
            ));
        }
        if self.resilience.response_timeout_ms == 0 {
            return Err(ChatError::Config(
                "resilience.response_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
