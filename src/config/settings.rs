// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for chatline
//!
//! Handles loading and saving settings from ~/.chatline/settings.json

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chat::locale::Language;
use crate::llm::provider::ProviderKind;

mod io;
mod migration;
mod validation;

/// Main settings structure, stored in ~/.chatline/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// LLM provider configurations
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Web search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Chat session defaults
    #[serde(default)]
    pub chat: ChatConfig,

    /// Retry and timeout settings for API calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Daily digest settings
    #[serde(default)]
    pub digest: DigestConfig,
}

/// Configuration for LLM providers
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// OpenRouter configuration
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Groq configuration
    #[serde(default)]
    pub groq: GroqConfig,
}

/// OpenRouter configuration (many models via a single API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_openrouter_api_key_env")]
    pub api_key_env: String,

    /// Default model to use
    #[serde(default = "default_openrouter_model")]
    pub default_model: String,

    /// Base URL for API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Value for the HTTP-Referer attribution header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// Value for the X-Title attribution header
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

/// Groq configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroqConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_groq_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_groq_model")]
    pub default_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub tavily: TavilyConfig,
}

/// Tavily search API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_tavily_api_key_env")]
    pub api_key_env: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// "basic" or "advanced"
    #[serde(default = "default_search_depth")]
    pub search_depth: String,

    #[serde(default = "default_search_max_results")]
    pub max_results: u32,
}

/// Chat session defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Which provider serves chat requests
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model override; falls back to the provider's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Number of trailing turns serialized into each request
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Language for user-visible strings
    #[serde(default)]
    pub language: Language,

    /// Custom system prompt (the localized default is used when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Run a web search before each answer
    #[serde(default)]
    pub search_enabled: bool,
}

/// Retry and timeout configuration for API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Extra attempts after the first failed request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Idle and no-content timeout for streamed responses
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

/// Daily news digest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    /// How long a generated digest stays fresh
    #[serde(default = "default_digest_ttl_hours")]
    pub ttl_hours: u64,

    /// News sites the search is restricted to
    #[serde(default = "default_digest_domains")]
    pub include_domains: Vec<String>,

    /// Topic searched for, suffixed with the current date
    #[serde(default = "default_digest_topic")]
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ResilienceConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl DigestConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 60 * 60)
    }
}

fn default_openrouter_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_openrouter_model() -> String {
    crate::llm::models::DEFAULT_MODEL_ID.to_string()
}

fn default_site_name() -> String {
    "Chatline AI Assistant".to_string()
}

fn default_groq_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_groq_model() -> String {
    "deepseek-r1-distill-llama-70b".to_string()
}

fn default_tavily_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_search_depth() -> String {
    "advanced".to_string()
}

fn default_search_max_results() -> u32 {
    5
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_context_window() -> usize {
    10
}

// Resilience config defaults
fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_response_timeout_ms() -> u64 {
    20_000
}

fn default_digest_ttl_hours() -> u64 {
    12
}

fn default_digest_domains() -> Vec<String> {
    [
        "nzherald.co.nz",
        "stuff.co.nz",
        "rnz.co.nz",
        "newshub.co.nz",
        "tvnz.co.nz",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}

fn default_digest_topic() -> String {
    "New Zealand Today's News".to_string()
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_openrouter_api_key_env(),
            default_model: default_openrouter_model(),
            base_url: None,
            site_url: None,
            site_name: default_site_name(),
        }
    }
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_groq_api_key_env(),
            default_model: default_groq_model(),
            base_url: None,
        }
    }
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_tavily_api_key_env(),
            base_url: None,
            search_depth: default_search_depth(),
            max_results: default_search_max_results(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_window: default_context_window(),
            language: Language::default(),
            system_prompt: None,
            search_enabled: false,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_digest_ttl_hours(),
            include_domains: default_digest_domains(),
            topic: default_digest_topic(),
            model: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chat_config_default() {
        let config = ChatConfig::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.context_window, 10);
        assert!(!config.search_enabled);
        assert_eq!(config.provider, ProviderKind::OpenRouter);
    }

    #[test]
    fn test_resilience_config_default() {
        let config = ResilienceConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.response_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_digest_config_default() {
        let config = DigestConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(12 * 3600));
        assert_eq!(config.include_domains.len(), 5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"chat": {"context_window": 4}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.chat.context_window, 4);
        assert_eq!(settings.chat.max_tokens, 2000);
        assert_eq!(settings.resilience.max_retries, 2);
        assert_eq!(settings.providers.openrouter.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn test_settings_load_from_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.chat.context_window, 10);
    }

    #[test]
    fn test_settings_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test_settings.json");

        let mut settings = Settings::default();
        settings.chat.temperature = 0.5;
        settings.chat.language = Language::En;
        settings.chat.search_enabled = true;

        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.chat.temperature, 0.5);
        assert_eq!(loaded.chat.language, Language::En);
        assert!(loaded.chat.search_enabled);
    }

    #[test]
    fn test_settings_save_preserves_unknown_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"experimental": {"flag": true}, "chat": {"max_tokens": 10}}"#)
            .unwrap();

        let mut settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.chat.max_tokens, 10);
        settings.chat.max_tokens = 512;
        settings.save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["experimental"]["flag"], true);
        assert_eq!(raw["chat"]["max_tokens"], 512);
    }

    #[test]
    fn test_settings_save_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("settings.json");

        Settings::default().save_to(&path).unwrap();
        assert!(path.exists());
    }
}
