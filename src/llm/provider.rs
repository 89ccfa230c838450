// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat-completion endpoints
//!
//! Both supported providers speak the OpenAI-compatible chat-completions
//! protocol, so an endpoint is just a URL, a bearer key and some optional
//! attribution headers.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{ChatError, Result};

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Which upstream serves chat completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenRouter,
    Groq,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Groq => "groq",
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => OPENROUTER_API_URL,
            ProviderKind::Groq => GROQ_API_URL,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "groq" => Ok(ProviderKind::Groq),
            other => Err(ChatError::InvalidInput(format!(
                "unknown provider '{}', expected openrouter or groq",
                other
            ))),
        }
    }
}

/// A resolved chat-completion endpoint
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub kind: ProviderKind,
    pub url: String,
    pub api_key: Option<String>,
    /// Sent as `HTTP-Referer` (OpenRouter attribution)
    pub site_url: Option<String>,
    /// Sent as `X-Title` (OpenRouter attribution)
    pub site_name: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(kind: ProviderKind, api_key: Option<String>) -> Self {
        Self {
            kind,
            url: kind.default_url().to_string(),
            api_key,
            site_url: None,
            site_name: None,
        }
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenRouter, Some(api_key.into()))
    }

    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::Groq, Some(api_key.into()))
    }

    /// Point at a custom URL (proxies, tests)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    pub fn with_site_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = Some(name.into());
        self
    }

    /// Build the endpoint for `kind` from settings.
    ///
    /// Fails when no API key can be found in the environment or the
    /// settings file.
    pub fn from_settings(settings: &Settings, kind: ProviderKind) -> Result<Self> {
        match kind {
            ProviderKind::OpenRouter => {
                let config = &settings.providers.openrouter;
                let key = settings.get_openrouter_api_key().ok_or_else(|| {
                    ChatError::Config(format!(
                        "No OpenRouter API key found. Set {} or add providers.openrouter.api_key to settings",
                        config.api_key_env
                    ))
                })?;
                let mut endpoint = Self::openrouter(key).with_site_name(config.site_name.clone());
                if let Some(url) = &config.base_url {
                    endpoint = endpoint.with_url(url.clone());
                }
                if let Some(site_url) = &config.site_url {
                    endpoint = endpoint.with_site_url(site_url.clone());
                }
                Ok(endpoint)
            }
            ProviderKind::Groq => {
                let config = &settings.providers.groq;
                let key = settings.get_groq_api_key().ok_or_else(|| {
                    ChatError::Config(format!(
                        "No Groq API key found. Set {} or add providers.groq.api_key to settings",
                        config.api_key_env
                    ))
                })?;
                let mut endpoint = Self::groq(key);
                if let Some(url) = &config.base_url {
                    endpoint = endpoint.with_url(url.clone());
                }
                Ok(endpoint)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_serde() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::OpenRouter).unwrap(),
            "\"openrouter\""
        );
        let kind: ProviderKind = serde_json::from_str("\"groq\"").unwrap();
        assert_eq!(kind, ProviderKind::Groq);
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("OpenRouter".parse::<ProviderKind>().unwrap(), ProviderKind::OpenRouter);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_endpoint_defaults() {
        let endpoint = ProviderEndpoint::openrouter("sk-test");
        assert_eq!(endpoint.url, OPENROUTER_API_URL);
        assert_eq!(endpoint.api_key.as_deref(), Some("sk-test"));
        assert!(endpoint.site_url.is_none());

        let endpoint = ProviderEndpoint::groq("gsk-test").with_url("http://localhost:9/v1");
        assert_eq!(endpoint.kind, ProviderKind::Groq);
        assert_eq!(endpoint.url, "http://localhost:9/v1");
    }

    #[test]
    fn test_from_settings_uses_stored_key_and_site_headers() {
        let mut settings = Settings::default();
        settings.providers.openrouter.api_key_env = "CHATLINE_TEST_UNSET_KEY_40211".to_string();
        settings.providers.openrouter.api_key = Some("stored".to_string());
        settings.providers.openrouter.site_url = Some("https://example.org".to_string());

        let endpoint = ProviderEndpoint::from_settings(&settings, ProviderKind::OpenRouter).unwrap();
        assert_eq!(endpoint.api_key.as_deref(), Some("stored"));
        assert_eq!(endpoint.site_url.as_deref(), Some("https://example.org"));
        assert_eq!(endpoint.site_name.as_deref(), Some("Chatline AI Assistant"));
    }

    #[test]
    fn test_from_settings_missing_key() {
        let mut settings = Settings::default();
        settings.providers.groq.api_key_env = "CHATLINE_TEST_UNSET_KEY_40212".to_string();
        let err = ProviderEndpoint::from_settings(&settings, ProviderKind::Groq).unwrap_err();
        assert!(err.to_string().contains("CHATLINE_TEST_UNSET_KEY_40212"));
    }
}
