// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! User-visible strings in the two supported languages

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Display language for greetings, notices and prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    En,
}

impl std::str::FromStr for Language {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" | "chinese" => Ok(Language::Zh),
            "en" | "en-us" | "english" => Ok(Language::En),
            other => Err(ChatError::InvalidInput(format!(
                "unsupported language '{}', expected zh or en",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }

    /// First turn of a fresh session
    pub fn greeting(&self) -> &'static str {
        match self {
            Language::Zh => "你好！我是AI万能助手。我可以帮你解答问题，输入 /search on 可以让我先联网搜索。",
            Language::En => "Hello! I'm your AI Assistant. I can help answer your questions. Type /search on to let me search the web first.",
        }
    }

    pub fn default_system_prompt(&self) -> &'static str {
        match self {
            Language::Zh => "你是一个有用的AI助手。请用简洁、准确、友好的方式回答用户的问题。",
            Language::En => "You are a helpful AI assistant. Please answer the user's questions in a concise, accurate, and friendly manner.",
        }
    }

    /// Appended to the system prompt when search results accompany a request
    pub fn search_instruction(&self) -> &'static str {
        match self {
            Language::Zh => "\n\n我已经为你提供了网络搜索结果。请基于这些搜索结果回答用户的问题，并在回答中引用相关的信息来源。如果搜索结果不足以回答问题，请说明并尽可能提供有用的信息。",
            Language::En => "\n\nI have provided you with web search results. Please answer the user's question based on these search results and cite relevant sources in your answer. If the search results are insufficient to answer the question, please state so and provide as much useful information as possible.",
        }
    }

    /// Shown when a stream settles without any content
    pub fn no_answer_fallback(&self) -> &'static str {
        match self {
            Language::Zh => "我已经收到了您的问题，但目前无法生成回答。请尝试重新提问或选择其他模型。",
            Language::En => "I've received your question, but I'm unable to generate an answer at the moment. Please try asking again or select a different model.",
        }
    }

    /// Replaces the assistant turn when a request fails
    pub fn failure_message(&self) -> &'static str {
        match self {
            Language::Zh => "抱歉，处理您的请求时出现了错误。请稍后再试或尝试其他模型。",
            Language::En => "Sorry, an error occurred while processing your request. Please try again later or try another model.",
        }
    }

    pub fn searching_notice(&self) -> &'static str {
        match self {
            Language::Zh => "正在搜索相关信息...",
            Language::En => "Searching for relevant information...",
        }
    }

    pub fn search_failed(&self) -> &'static str {
        match self {
            Language::Zh => "搜索过程中发生错误，无法获取结果。",
            Language::En => "An error occurred during the search, unable to get results.",
        }
    }

    pub fn search_unauthorized(&self) -> &'static str {
        match self {
            Language::Zh => "搜索API密钥无效或缺失，请联系管理员。",
            Language::En => "The search API key is invalid or missing, please contact the administrator.",
        }
    }

    pub fn search_no_results(&self) -> &'static str {
        match self {
            Language::Zh => "搜索没有返回任何结果。",
            Language::En => "The search returned no results.",
        }
    }

    pub fn search_results_heading(&self) -> &'static str {
        match self {
            Language::Zh => "### 搜索结果",
            Language::En => "### Search Results",
        }
    }

    pub fn summary_label(&self) -> &'static str {
        match self {
            Language::Zh => "摘要",
            Language::En => "Summary",
        }
    }

    pub fn details_label(&self) -> &'static str {
        match self {
            Language::Zh => "详细信息",
            Language::En => "Details",
        }
    }

    pub fn published_label(&self) -> &'static str {
        match self {
            Language::Zh => "发布日期",
            Language::En => "Published date",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_serde() {
        assert_eq!(serde_json::to_string(&Language::Zh).unwrap(), "\"zh\"");
        let lang: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(lang, Language::En);
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!("zh-CN".parse::<Language>().unwrap(), Language::Zh);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_strings_differ_per_language() {
        for (zh, en) in [
            (Language::Zh.greeting(), Language::En.greeting()),
            (Language::Zh.failure_message(), Language::En.failure_message()),
            (Language::Zh.no_answer_fallback(), Language::En.no_answer_fallback()),
        ] {
            assert!(!zh.is_empty());
            assert_ne!(zh, en);
        }
    }

    #[test]
    fn test_search_instruction_starts_on_new_paragraph() {
        assert!(Language::En.search_instruction().starts_with("\n\n"));
        assert!(Language::Zh.search_instruction().starts_with("\n\n"));
    }
}
