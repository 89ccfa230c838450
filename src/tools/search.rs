// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Web search tool
//!
//! `WebSearch` is the seam the session and the digest service call through;
//! `TavilyClient` is the production implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::chat::locale::Language;
use crate::config::Settings;
use crate::error::{ChatError, Result};

pub const TAVILY_API_URL: &str = "https://api.tavily.com/search";
/// Tool name recorded on search turns
pub const SEARCH_TOOL_NAME: &str = "tavily_search";

/// Characters of each hit's content kept in formatted results
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

impl std::str::FromStr for SearchDepth {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(SearchDepth::Basic),
            "advanced" => Ok(SearchDepth::Advanced),
            other => Err(ChatError::Config(format!(
                "search depth must be basic or advanced, got '{}'",
                other
            ))),
        }
    }
}

/// A search query and its options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub search_depth: SearchDepth,
    pub include_answer: bool,
    pub include_images: bool,
    pub include_raw_content: bool,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_depth: SearchDepth::Advanced,
            include_answer: true,
            include_images: false,
            include_raw_content: false,
            max_results: 5,
            include_domains: Vec::new(),
        }
    }

    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.search_depth = depth;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.include_domains = domains;
        self
    }

    pub fn with_answer(mut self, include: bool) -> Self {
        self.include_answer = include;
        self
    }

    pub fn with_raw_content(mut self, include: bool) -> Self {
        self.include_raw_content = include;
        self
    }
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

/// Search response: optional synthesized answer plus hits
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

/// Something that can run a web search
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Tool name recorded on the turn that shows the results
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    /// Search with the implementation's default options
    fn request(&self, query: &str) -> SearchRequest {
        SearchRequest::new(query)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

/// Tavily search API client
#[derive(Debug, Clone)]
pub struct TavilyClient {
    client: Client,
    api_key: String,
    base_url: String,
    search_depth: SearchDepth,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<TavilyErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TavilyErrorDetail {
    Nested { error: String },
    Plain(String),
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: TAVILY_API_URL.to_string(),
            search_depth: SearchDepth::Advanced,
            max_results: 5,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_defaults(mut self, depth: SearchDepth, max_results: u32) -> Self {
        self.search_depth = depth;
        self.max_results = max_results;
        self
    }

    /// Build a client from settings; `Ok(None)` when no key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let config = &settings.search.tavily;
        let Some(api_key) = settings.get_tavily_api_key() else {
            return Ok(None);
        };
        let depth: SearchDepth = config.search_depth.parse()?;
        let mut client = Self::new(api_key).with_defaults(depth, config.max_results);
        if let Some(url) = &config.base_url {
            client = client.with_base_url(url.clone());
        }
        Ok(Some(client))
    }

    fn parse_error(status: StatusCode, body: &str) -> ChatError {
        let detail = serde_json::from_str::<TavilyError>(body)
            .ok()
            .and_then(|e| {
                e.error.or(e.detail.map(|d| match d {
                    TavilyErrorDetail::Nested { error } => error,
                    TavilyErrorDetail::Plain(message) => message,
                }))
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });

        if status == StatusCode::UNAUTHORIZED {
            ChatError::ToolCallFailed(format!("Unauthorized: {}", detail))
        } else {
            ChatError::ToolCallFailed(format!("search failed ({}): {}", status.as_u16(), detail))
        }
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    fn request(&self, query: &str) -> SearchRequest {
        SearchRequest::new(query)
            .with_depth(self.search_depth)
            .with_max_results(self.max_results)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        tracing::debug!(
            target: "chatline.search",
            query = %request.query,
            depth = ?request.search_depth,
            max_results = request.max_results,
            "searching"
        );

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::ToolCallFailed(format!("search request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let err = Self::parse_error(status, &body);
            tracing::warn!(target: "chatline.search", status = status.as_u16(), error = %err, "search failed");
            return Err(err);
        }

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::ToolCallFailed(format!("malformed search response: {}", e)))?;

        tracing::debug!(target: "chatline.search", hits = parsed.results.len(), "search complete");
        Ok(parsed)
    }
}

/// Render search results as the markdown block shown to the user and fed
/// to the model.
pub fn format_results(response: &SearchResponse, lang: Language) -> String {
    if response.answer.is_none() && response.results.is_empty() {
        return lang.search_no_results().to_string();
    }

    let mut out = format!("{}\n\n", lang.search_results_heading());

    if let Some(answer) = response.answer.as_deref().filter(|a| !a.trim().is_empty()) {
        out.push_str(&format!("**{}**: {}\n\n", lang.summary_label(), answer));
    }

    if !response.results.is_empty() {
        out.push_str(&format!("**{}**:\n\n", lang.details_label()));
        for (i, hit) in response.results.iter().enumerate() {
            out.push_str(&format!("{}. **[{}]({})**\n", i + 1, hit.title, hit.url));
            if let Some(date) = &hit.published_date {
                out.push_str(&format!("   {}: {}\n", lang.published_label(), date));
            }
            let snippet: String = hit.content.chars().take(SNIPPET_CHARS).collect();
            out.push_str(&format!("   {}...\n\n", snippet));
        }
    }

    out
}

/// Notice shown in place of results when a search fails
pub fn failure_notice(error: &ChatError, lang: Language) -> String {
    let message = error.to_string();
    if message.contains("Unauthorized") {
        lang.search_unauthorized().to_string()
    } else {
        lang.search_failed().to_string()
    }
}
