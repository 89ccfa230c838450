// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chatline - streaming chat sessions against OpenAI-compatible endpoints.
//!
//! This crate exposes the runtime used by the `chatline` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `chat`: request composition, SSE stream consumption, session coordinator
//! - `llm`: wire messages, model catalog, endpoints, retrying dispatcher
//! - `tools`: web search (Tavily) and result formatting
//! - `cache`, `digest`: per-language daily news digest with TTL caching
//! - `config`: settings file with env-var API keys

pub mod cache;
pub mod chat;
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod llm;
pub mod tools;

pub use error::{ChatError, Result};
