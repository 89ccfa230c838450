// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Daily news digest
//!
//! Searches a fixed set of news sites for today's stories, asks a model to
//! write a summary report, and caches the report per language.

use std::sync::{Arc, OnceLock};

use chrono::Local;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::chat::compose::{ComposedRequest, RequestParams};
use crate::chat::locale::Language;
use crate::config::settings::DigestConfig;
use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::llm::dispatch::Dispatcher;
use crate::llm::provider::{ProviderEndpoint, ProviderKind};
use crate::llm::retry::RetryPolicy;
use crate::tools::search::{SearchHit, SearchRequest, TavilyClient, WebSearch};

const MAX_NEWS_ITEMS: usize = 5;
const PROMPT_CONTENT_CHARS: usize = 1000;
const BACKUP_CONTENT_CHARS: usize = 500;

/// A story picked from the search results
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub content: String,
    pub url: String,
    /// Host name without a leading `www.`
    pub source: String,
}

impl NewsItem {
    /// None when the hit lacks a title or content
    fn from_hit(hit: &SearchHit) -> Option<Self> {
        if hit.title.trim().is_empty() || hit.content.trim().is_empty() {
            return None;
        }
        Some(Self {
            title: hit.title.clone(),
            content: hit.content.clone(),
            url: hit.url.clone(),
            source: source_of(&hit.url),
        })
    }
}

fn source_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| url.to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// A generated report
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub summary: String,
    /// Local date the report covers, `YYYY-MM-DD`
    pub date: String,
    pub news_count: usize,
    /// Produced by the shorter fallback prompt
    pub is_backup: bool,
}

/// A digest as served to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct DigestReport {
    pub digest: Digest,
    pub from_cache: bool,
    /// Generation failed and an older report was served instead
    pub stale: bool,
}

/// Remove `<think>` / `<thinking>` blocks, any case, and trim.
pub fn strip_thinking(text: &str) -> String {
    static THINK_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = THINK_BLOCK.get_or_init(|| Regex::new(r"(?is)<think(?:ing)?>.*?</think(?:ing)?>").ok());
    match pattern {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Shown when no report can be produced and nothing is cached
pub fn unavailable_notice(lang: Language) -> &'static str {
    match lang {
        Language::Zh => "# 新西兰今日要闻\n\n很抱歉，目前无法获取最新新闻。请稍后再试。\n\n可能的原因：\n- API连接问题\n- 新闻源暂时不可用\n- AI服务暂时中断",
        Language::En => "# New Zealand Today's Headlines\n\nSorry, we are currently unable to retrieve the latest news. Please try again later.\n\nPossible reasons:\n- API connection issues\n- News sources temporarily unavailable\n- AI service interruption",
    }
}

fn system_prompt(lang: Language) -> &'static str {
    match lang {
        Language::Zh => "你是一位资深的国际新闻编辑和翻译专家，精通中英文，擅长将英文新闻准确翻译并制作成高质量的中文新闻摘要。\n\n## 输出要求：\n1. 使用清晰、专业的中文新闻报道风格\n2. 每条新闻摘要应包含事件背景、关键事实、相关影响\n3. 保留重要的数字、日期、人名和地点\n4. 使用Markdown格式增强可读性\n5. 不要在回复中包含任何思考标签",
        Language::En => "You are a professional international news editor, skilled at summarizing news accurately into high-quality English news summaries.\n\n## Output requirements:\n1. Use a clear, professional news reporting style\n2. Each summary should include event background, key facts, and related impacts\n3. Retain important numbers, dates, names, and locations\n4. Use Markdown format to enhance readability\n5. Do not include any thinking tags in your response",
    }
}

fn news_prompt(lang: Language, items: &[NewsItem], today: &str) -> String {
    let (news, title, source, link, content) = match lang {
        Language::Zh => ("新闻", "标题", "来源", "链接", "内容"),
        Language::En => ("News", "Title", "Source", "Link", "Content"),
    };
    let body = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{} {}:\n{}: {}\n{}: {}\n{}: {}\n{}: {}...\n",
                news,
                i + 1,
                title,
                item.title,
                source,
                item.source,
                link,
                item.url,
                content,
                truncate(&item.content, PROMPT_CONTENT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    match lang {
        Language::Zh => format!(
            "请将以下新西兰今日新闻翻译并制作成一份高质量的中文日报：\n\n{body}\n\n## 输出格式要求：\n\n# 新西兰今日要闻 ({today})\n\n## 今日概览\n(用3-4句话概括今天的整体新闻趋势)\n\n## 新闻详情\n\n### 1. [新闻标题的中文翻译]\n(150-200字的详细摘要)\n[原文链接](对应的URL)\n\n...以此类推完成所有新闻\n\n## 今日分析\n(对今日新闻的综合分析)\n\n## 词汇表\n(列出3-5个专业术语或新西兰特有表达并简短解释)"
        ),
        Language::En => format!(
            "Please summarize the following New Zealand news from today into a high-quality English daily report:\n\n{body}\n\n## Output Format Requirements:\n\n# New Zealand Today's Headlines ({today})\n\n## Today's Overview\n(Summarize the overall news trends in 3-4 sentences)\n\n## News Details\n\n### 1. [First news headline]\n(Detailed 150-200 word summary)\n[Original link](corresponding URL)\n\n...continue for all news items\n\n## Today's Analysis\n(Comprehensive analysis of today's news)\n\n## Glossary\n(List 3-5 terms or New Zealand-specific expressions with brief explanations)"
        ),
    }
}

fn backup_prompt(lang: Language, items: &[NewsItem]) -> String {
    let body = items
        .iter()
        .map(|item| format!("{}\n{}", item.title, truncate(&item.content, BACKUP_CONTENT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");

    match lang {
        Language::Zh => format!(
            "请将以下新西兰今日新闻总结为中文日报，简明扼要但内容丰富：\n\n{body}\n\n请用专业的中文新闻风格总结要点，包括事件背景、关键事实和可能的影响，使用Markdown格式。不要包含任何思考标签。"
        ),
        Language::En => format!(
            "Please summarize the following New Zealand news from today into an English daily report, concise yet informative:\n\n{body}\n\nUse a professional news style covering event background, key facts, and possible impacts, formatted in Markdown. Do not include any thinking tags."
        ),
    }
}

/// Builds and caches the daily digest
pub struct DigestService {
    search: Arc<dyn WebSearch>,
    dispatcher: Dispatcher,
    config: DigestConfig,
    model_id: String,
    cache: TtlCache<Language, Digest>,
    clock: Arc<dyn Clock>,
}

impl DigestService {
    pub fn new(
        search: Arc<dyn WebSearch>,
        dispatcher: Dispatcher,
        config: DigestConfig,
        model_id: impl Into<String>,
    ) -> Self {
        Self::with_clock(search, dispatcher, config, model_id, Arc::new(SystemClock))
    }

    pub fn with_clock(
        search: Arc<dyn WebSearch>,
        dispatcher: Dispatcher,
        config: DigestConfig,
        model_id: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = TtlCache::with_clock(config.ttl(), clock.clone());
        Self {
            search,
            dispatcher,
            config,
            model_id: model_id.into(),
            cache,
            clock,
        }
    }

    /// Groq for generation, Tavily for search; both keys are required.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let search = TavilyClient::from_settings(settings)?.ok_or_else(|| {
            ChatError::Config(format!(
                "The digest needs a Tavily API key. Set {}",
                settings.search.tavily.api_key_env
            ))
        })?;
        let endpoint = ProviderEndpoint::from_settings(settings, ProviderKind::Groq)?;
        let dispatcher = Dispatcher::new(endpoint, RetryPolicy::from(&settings.resilience));
        let model_id = settings
            .digest
            .model
            .clone()
            .unwrap_or_else(|| settings.providers.groq.default_model.clone());

        Ok(Self::new(
            Arc::new(search),
            dispatcher,
            settings.digest.clone(),
            model_id,
        ))
    }

    fn today(&self) -> String {
        self.clock
            .now()
            .with_timezone(&Local)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Today's digest in `lang`, cached for the configured TTL.
    ///
    /// `force` regenerates even when a fresh report is cached. When
    /// generation fails, any earlier report for `lang` is served instead.
    pub async fn daily(&self, lang: Language, force: bool) -> Result<DigestReport> {
        let refresh = || self.generate(lang);
        let cached = if force {
            self.cache.force_refresh(lang, refresh).await?
        } else {
            self.cache.get_or_refresh(lang, refresh).await?
        };

        Ok(DigestReport {
            digest: cached.value,
            from_cache: cached.from_cache,
            stale: cached.stale,
        })
    }

    async fn fetch_news(&self, today: &str) -> Result<Vec<NewsItem>> {
        let request = SearchRequest::new(format!("{} {}", self.config.topic, today))
            .with_domains(self.config.include_domains.clone())
            .with_max_results(MAX_NEWS_ITEMS as u32)
            .with_answer(false)
            .with_raw_content(true);

        let response = self.search.search(&request).await?;
        let items: Vec<NewsItem> = response
            .results
            .iter()
            .filter_map(NewsItem::from_hit)
            .take(MAX_NEWS_ITEMS)
            .collect();

        tracing::info!(target: "chatline.digest", hits = response.results.len(), items = items.len(), "news fetched");
        Ok(items)
    }

    async fn generate(&self, lang: Language) -> Result<Digest> {
        let today = self.today();
        let items = self.fetch_news(&today).await?;
        if items.is_empty() {
            return Err(ChatError::ToolCallFailed("No relevant news found".to_string()));
        }

        // the digest is not user-cancellable; the token only satisfies the dispatcher
        let cancel = CancellationToken::new();
        let primary = ComposedRequest::single_turn(
            system_prompt(lang),
            &news_prompt(lang, &items, &today),
            &RequestParams {
                model_id: self.model_id.clone(),
                temperature: 0.3,
                max_tokens: 2500,
                stream: false,
            },
        );

        let (completion, is_backup) = match self.dispatcher.complete(&primary, &cancel).await {
            Ok(completion) => (completion, false),
            Err(e) => {
                tracing::warn!(target: "chatline.digest", error = %e, "digest generation failed, trying backup prompt");
                let backup = ComposedRequest::single_turn(
                    "",
                    &backup_prompt(lang, &items),
                    &RequestParams {
                        model_id: self.model_id.clone(),
                        temperature: 0.3,
                        max_tokens: 1500,
                        stream: false,
                    },
                );
                (self.dispatcher.complete(&backup, &cancel).await?, true)
            }
        };

        tracing::info!(target: "chatline.digest", lang = %lang, backup = is_backup, "digest generated");
        Ok(Digest {
            summary: strip_thinking(&completion.text),
            date: today,
            news_count: items.len(),
            is_backup,
        })
    }
}
