// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Bounded retry with a fixed delay for chat-completion calls

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::settings::ResilienceConfig;
use crate::error::{ApiError, ChatError, Result};

/// Extra attempts after the first one
pub const MAX_RETRIES: u32 = 2;
/// Wait between attempts
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Retry policy: at most `max_retries + 1` attempts, `delay` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Determine if an error is worth another attempt
pub fn is_retryable(error: &ChatError) -> bool {
    match error {
        ChatError::Api(api_error) => match api_error {
            // Any non-success status is retried, 4xx included
            ApiError::RequestFailed { .. } => true,
            ApiError::Transport(_) => true,

            ApiError::InvalidResponse(_) => false,
            ApiError::StreamError(_) => false,
        },
        ChatError::Http(_) => true,
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails permanently, or the budget is spent.
///
/// The operation receives the zero-based attempt number. Cancellation is
/// checked before every attempt and while waiting between attempts; once
/// the token fires the loop stops with `ChatError::Cancelled`, whatever
/// the last attempt returned.
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        target: "chatline.dispatch",
                        operation = operation_name,
                        attempts = attempt + 1,
                        "succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if error.is_cancelled() || cancel.is_cancelled() {
                    return Err(ChatError::Cancelled);
                }

                if !is_retryable(&error) {
                    tracing::warn!(
                        target: "chatline.dispatch",
                        operation = operation_name,
                        error = %error,
                        "non-retryable failure"
                    );
                    return Err(error);
                }

                if attempt >= policy.max_retries {
                    tracing::warn!(
                        target: "chatline.dispatch",
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %error,
                        "retry budget exhausted"
                    );
                    return Err(error);
                }

                tracing::warn!(
                    target: "chatline.dispatch",
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts(),
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, retrying"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn server_error(attempt: u32) -> ChatError {
        ChatError::Api(ApiError::RequestFailed {
            status: 500,
            attempts: attempt + 1,
            message: "Internal error".to_string(),
        })
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.delay, Duration::from_millis(1000));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_retry_policy_from_resilience_config() {
        let config = ResilienceConfig {
            max_retries: 4,
            retry_delay_ms: 250,
            response_timeout_ms: 1000,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&server_error(0)));
        assert!(is_retryable(&ChatError::Api(ApiError::RequestFailed {
            status: 404,
            attempts: 1,
            message: "not found".to_string(),
        })));
        assert!(is_retryable(&ChatError::Api(ApiError::Transport(
            "connection reset".to_string()
        ))));

        assert!(!is_retryable(&ChatError::Cancelled));
        assert!(!is_retryable(&ChatError::Api(ApiError::InvalidResponse(
            "bad json".to_string()
        ))));
        assert!(!is_retryable(&ChatError::Config("missing key".to_string())));
    }

    #[tokio::test]
    async fn test_with_retry_success_first_try() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(
            |_| async {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ChatError>(42)
            },
            &RetryPolicy::default(),
            &CancellationToken::new(),
            "test_operation",
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_success_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(
            |attempt| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(server_error(attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            &RetryPolicy::default(),
            &CancellationToken::new(),
            "test_operation",
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let started = tokio::time::Instant::now();

        let result = with_retry(
            |attempt| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(server_error(attempt)) }
            },
            &RetryPolicy::default(),
            &CancellationToken::new(),
            "test_operation",
        )
        .await;

        match result {
            Err(ChatError::Api(ApiError::RequestFailed { attempts, .. })) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // two fixed waits between three attempts
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_transport_error_uses_full_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(
            |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ChatError::Api(ApiError::Transport("connection refused".into()))) }
            },
            &RetryPolicy::default(),
            &CancellationToken::new(),
            "test_operation",
        )
        .await;

        assert!(matches!(result, Err(ChatError::Api(ApiError::Transport(_)))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(
            |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ChatError::Api(ApiError::InvalidResponse("x".into()))) }
            },
            &RetryPolicy::default(),
            &CancellationToken::new(),
            "test_operation",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(
            |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ChatError>(()) }
            },
            &RetryPolicy::default(),
            &cancel,
            "test_operation",
        )
        .await;

        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_cancel_during_delay() {
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result = with_retry(
            |attempt| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(server_error(attempt)) }
            },
            &RetryPolicy::default(),
            &cancel,
            "test_operation",
        )
        .await;

        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_cancelled_error_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(
            |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ChatError::Cancelled) }
            },
            &RetryPolicy::default(),
            &CancellationToken::new(),
            "test_operation",
        )
        .await;

        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
