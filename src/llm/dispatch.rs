// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request dispatcher
//!
//! Sends a composed request to the configured endpoint, retrying failed
//! attempts under the session's `RetryPolicy`. Cancellation aborts the
//! in-flight request and any pending retry wait.

use reqwest::{Client, Response};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::chat::compose::ComposedRequest;
use crate::error::{ApiError, ChatError, Result};
use crate::llm::provider::ProviderEndpoint;
use crate::llm::retry::{with_retry, RetryPolicy};

/// Sends chat-completion requests to one endpoint
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    endpoint: ProviderEndpoint,
    policy: RetryPolicy,
}

/// Result of a non-streaming completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model reported by the upstream, falling back to the requested one
    pub model_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { message: String },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull a human-readable message out of an upstream error body
pub(crate) fn upstream_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody::Detailed { message },
        })
        | Ok(ErrorEnvelope {
            error: ErrorBody::Plain(message),
        }) => message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().chars().take(500).collect(),
    }
}

impl Dispatcher {
    pub fn new(endpoint: ProviderEndpoint, policy: RetryPolicy) -> Self {
        Self::with_client(Client::new(), endpoint, policy)
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(client: Client, endpoint: ProviderEndpoint, policy: RetryPolicy) -> Self {
        Self {
            client,
            endpoint,
            policy,
        }
    }

    pub fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One attempt: POST the body and check the status.
    async fn post_once(
        &self,
        request: &ComposedRequest,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<Response> {
        let mut req = self.client.post(&self.endpoint.url).json(request);
        if let Some(ref api_key) = self.endpoint.api_key {
            req = req.bearer_auth(api_key);
        }
        if let Some(ref site_url) = self.endpoint.site_url {
            req = req.header("HTTP-Referer", site_url);
        }
        if let Some(ref site_name) = self.endpoint.site_name {
            req = req.header("X-Title", site_name);
        }

        tracing::debug!(
            target: "chatline.dispatch",
            provider = %self.endpoint.kind,
            model = %request.model_id,
            attempt = attempt + 1,
            stream = request.stream,
            "sending request"
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            sent = req.send() => sent,
        };
        let response = response.map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            text = response.text() => text.unwrap_or_default(),
        };
        Err(ApiError::RequestFailed {
            status: status.as_u16(),
            attempts: attempt + 1,
            message: upstream_error_message(&body),
        }
        .into())
    }

    /// Send `request` and return the successful response, body unread.
    ///
    /// Non-success statuses and transport failures are retried; after the
    /// last attempt the error carries the final status and attempt count.
    pub async fn send(
        &self,
        request: &ComposedRequest,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        with_retry(
            |attempt| self.post_once(request, cancel, attempt),
            &self.policy,
            cancel,
            "chat_completion",
        )
        .await
    }

    /// Non-streaming completion: send with `stream: false` and read the
    /// first choice's message.
    pub async fn complete(
        &self,
        request: &ComposedRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let request = request.clone().streaming(false);
        let response = self.send(&request, cancel).await?;

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            text = response.text() => text.map_err(|e| ApiError::Transport(e.to_string()))?,
        };

        let parsed: CompletionBody = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("malformed completion body: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ApiError::InvalidResponse("No choices in response".to_string()))?;

        Ok(Completion {
            text,
            model_id: parsed.model.unwrap_or(request.model_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_message_detailed() {
        let body = r#"{"error": {"message": "Rate limit exceeded", "code": 429}}"#;
        assert_eq!(upstream_error_message(body), "Rate limit exceeded");
    }

    #[test]
    fn test_upstream_error_message_plain_string() {
        let body = r#"{"error": "Unauthorized"}"#;
        assert_eq!(upstream_error_message(body), "Unauthorized");
    }

    #[test]
    fn test_upstream_error_message_raw_body() {
        assert_eq!(upstream_error_message("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(upstream_error_message(""), "empty response body");
    }

    #[test]
    fn test_dispatcher_accessors() {
        let dispatcher = Dispatcher::new(ProviderEndpoint::groq("k"), RetryPolicy::default());
        assert_eq!(dispatcher.policy().max_retries, 2);
        assert_eq!(dispatcher.endpoint().api_key.as_deref(), Some("k"));
    }
}
