// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for chatline
//!
//! Only failures that can reach a caller live here. Stream timeouts and
//! malformed SSE chunks are absorbed by the stream consumer and surface as
//! settlement details instead (see `chat::streaming`).

use thiserror::Error;

/// Main error type for chatline operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The caller aborted the in-flight request
    #[error("Request cancelled")]
    Cancelled,

    /// A tool call (e.g. web search) failed
    #[error("Tool call failed: {0}")]
    ToolCallFailed(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Session errors
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-success HTTP status after the retry budget was spent
    #[error("Request failed ({status}) after {attempts} attempt(s): {message}")]
    RequestFailed {
        status: u16,
        attempts: u32,
        message: String,
    },

    /// Network-level failure (connect, reset, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Hard read error while consuming a stream
    #[error("Streaming error: {0}")]
    StreamError(String),
}

impl ChatError {
    /// Whether this error is a user-initiated cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }
}

/// Result type alias for chatline operations
pub type Result<T> = std::result::Result<T, ChatError>;
