// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session management
//!
//! A `ChatSession` owns the conversation log and runs one request at a
//! time: optional web search, request composition, dispatch and stream
//! consumption. Turns are updated by id, so a cancelled request that is
//! still unwinding never touches the turns of the request that replaced it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::chat::compose::{compose, ComposedRequest, RequestParams, ToolResult};
use crate::chat::locale::Language;
use crate::chat::streaming::{SettleReason, StreamConfig, StreamConsumer, StreamOutcome, RESPONSE_TIMEOUT};
use crate::config::Settings;
use crate::error::{ChatError, Result};
use crate::llm::dispatch::Dispatcher;
use crate::llm::message::{ConversationTurn, TurnId};
use crate::llm::models::DEFAULT_MODEL_ID;
use crate::llm::provider::ProviderEndpoint;
use crate::llm::retry::RetryPolicy;
use crate::tools::search::{failure_notice, format_results, TavilyClient, WebSearch};

/// Receives session events as they happen.
///
/// Callbacks run on the task driving the request, after the session lock
/// has been released, so they may call back into the session.
pub trait SessionObserver: Send + Sync {
    fn on_turn_appended(&self, _turn: &ConversationTurn) {}

    /// Text of a streaming turn changed
    fn on_turn_updated(&self, _turn: &ConversationTurn) {}

    /// A turn stopped streaming and holds its final text
    fn on_turn_settled(&self, _turn: &ConversationTurn) {}

    fn on_error(&self, _error: &ChatError) {}

    fn on_reset(&self, _turns: &[ConversationTurn]) {}
}

struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Result of a `submit` call
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Blank input, or another request is still active
    Ignored,
    /// The stream settled; `outcome.reason` tells how
    Completed {
        turn_id: TurnId,
        outcome: StreamOutcome,
    },
    /// Cancelled before the stream settled normally
    Cancelled,
    /// The request failed; the assistant turn shows the failure message
    Failed { turn_id: TurnId, error: String },
}

/// Request parameters that stay fixed for a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub context_window: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub language: Language,
    /// Idle and no-content window for streamed replies
    pub response_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            context_window: 10,
            temperature: 0.7,
            max_tokens: 2000,
            language: Language::default(),
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            context_window: settings.chat.context_window,
            temperature: settings.chat.temperature,
            max_tokens: settings.chat.max_tokens,
            language: settings.chat.language,
            response_timeout: settings.resilience.response_timeout(),
        }
    }
}

struct ActiveRequest {
    generation: u64,
    token: CancellationToken,
}

struct SessionState {
    turns: Vec<ConversationTurn>,
    active: Option<ActiveRequest>,
    next_generation: u64,
    /// Replies in the current request that settled without content
    retry_count: u32,
    last_error: Option<String>,
    model_id: String,
    system_prompt: Option<String>,
    search_enabled: bool,
}

struct SessionInner {
    state: Mutex<SessionState>,
    dispatcher: Dispatcher,
    search: Option<Arc<dyn WebSearch>>,
    observer: Arc<dyn SessionObserver>,
    options: SessionOptions,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(active) = state.active.take() {
            active.token.cancel();
        }
    }
}

/// Handle to a chat session; clones share the same session
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

/// Builder for creating ChatSession instances
pub struct ChatSessionBuilder {
    dispatcher: Dispatcher,
    options: SessionOptions,
    model_id: String,
    system_prompt: Option<String>,
    search_enabled: bool,
    search: Option<Arc<dyn WebSearch>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl ChatSessionBuilder {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            options: SessionOptions::default(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            system_prompt: None,
            search_enabled: false,
            search: None,
            observer: None,
        }
    }

    /// Builder wired from settings: provider endpoint, retry policy,
    /// session options, and Tavily search when a key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let endpoint = ProviderEndpoint::from_settings(settings, settings.chat.provider)?;
        let dispatcher = Dispatcher::new(endpoint, RetryPolicy::from(&settings.resilience));

        let mut builder = Self::new(dispatcher)
            .with_options(SessionOptions::from(settings))
            .with_model(settings.chat_model())
            .with_search_enabled(settings.chat.search_enabled);
        if let Some(prompt) = &settings.chat.system_prompt {
            builder = builder.with_system_prompt(prompt.clone());
        }
        if let Some(tavily) = TavilyClient::from_settings(settings)? {
            builder = builder.with_search(Arc::new(tavily));
        }
        Ok(builder)
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.options.language = language;
        self
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.options.context_window = context_window;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.options.response_timeout = timeout;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_search_enabled(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the session; its log starts with the greeting turn.
    pub fn build(self) -> ChatSession {
        let greeting = ConversationTurn::assistant(self.options.language.greeting());
        let state = SessionState {
            turns: vec![greeting],
            active: None,
            next_generation: 0,
            retry_count: 0,
            last_error: None,
            model_id: self.model_id,
            system_prompt: self.system_prompt,
            search_enabled: self.search_enabled,
        };

        ChatSession {
            inner: Arc::new(SessionInner {
                state: Mutex::new(state),
                dispatcher: self.dispatcher,
                search: self.search,
                observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
                options: self.options,
            }),
        }
    }
}

impl ChatSession {
    pub fn builder(dispatcher: Dispatcher) -> ChatSessionBuilder {
        ChatSessionBuilder::new(dispatcher)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn language(&self) -> Language {
        self.inner.options.language
    }

    fn append(&self, turn: ConversationTurn) {
        self.lock().turns.push(turn.clone());
        self.inner.observer.on_turn_appended(&turn);
    }

    /// Apply `f` to the turn with `id`; None when the turn is gone (reset).
    fn update<F>(&self, id: TurnId, f: F) -> Option<ConversationTurn>
    where
        F: FnOnce(&mut ConversationTurn),
    {
        let mut state = self.lock();
        let turn = state.turns.iter_mut().find(|t| t.id == id)?;
        f(turn);
        Some(turn.clone())
    }

    /// Mark a turn final with `text` (or its current text when None).
    fn settle_turn(&self, id: TurnId, text: Option<String>) {
        let settled = self.update(id, |turn| {
            turn.is_streaming = false;
            if let Some(text) = text {
                turn.text = text;
            }
        });
        if let Some(turn) = settled {
            self.inner.observer.on_turn_settled(&turn);
        }
    }

    /// Send `input` as the next user turn and drive the reply to completion.
    ///
    /// Blank input, or input arriving while another request is active, is
    /// ignored. Failures are recorded on the session (failure message in the
    /// assistant turn, `last_error`) rather than returned, so the session
    /// stays usable.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        if input.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }
        let language = self.language();

        let (generation, token, history, model_id, system_prompt, search_enabled) = {
            let mut state = self.lock();
            if state
                .active
                .as_ref()
                .is_some_and(|active| !active.token.is_cancelled())
            {
                tracing::debug!(target: "chatline.session", "request already active, ignoring submit");
                return SubmitOutcome::Ignored;
            }

            state.next_generation += 1;
            let generation = state.next_generation;
            let token = CancellationToken::new();
            state.active = Some(ActiveRequest {
                generation,
                token: token.clone(),
            });
            state.retry_count = 0;
            state.last_error = None;

            let system_prompt = state
                .system_prompt
                .clone()
                .unwrap_or_else(|| language.default_system_prompt().to_string());
            (
                generation,
                token,
                state.turns.clone(),
                state.model_id.clone(),
                system_prompt,
                state.search_enabled,
            )
        };

        tracing::info!(
            target: "chatline.session",
            generation,
            model = %model_id,
            search = search_enabled,
            "submitting"
        );

        self.append(ConversationTurn::user(input));

        let outcome = self
            .run(input, &history, &token, model_id, system_prompt, search_enabled)
            .await;

        let mut state = self.lock();
        if state
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
        {
            state.active = None;
        }
        outcome
    }

    async fn run(
        &self,
        input: &str,
        history: &[ConversationTurn],
        token: &CancellationToken,
        model_id: String,
        mut system_prompt: String,
        search_enabled: bool,
    ) -> SubmitOutcome {
        let language = self.language();
        let options = &self.inner.options;

        let mut tool_results = Vec::new();
        if search_enabled {
            if let Some(search) = self.inner.search.clone() {
                match self.run_search(search.as_ref(), input, token).await {
                    Ok(result) => {
                        tool_results.push(result);
                        system_prompt.push_str(language.search_instruction());
                    }
                    Err(_) => return SubmitOutcome::Cancelled,
                }
            } else {
                tracing::warn!(target: "chatline.session", "search enabled but no search tool configured");
            }
        }

        let placeholder = ConversationTurn::placeholder(model_id.clone());
        let turn_id = placeholder.id;
        self.append(placeholder);

        let params = RequestParams {
            model_id,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
        };
        let request = compose(
            input,
            history,
            Some(&turn_id),
            &system_prompt,
            &tool_results,
            options.context_window,
            &params,
        );

        match self.stream_reply(&request, turn_id, token).await {
            Ok(outcome) if outcome.reason == SettleReason::Cancelled => SubmitOutcome::Cancelled,
            Ok(outcome) => {
                if !outcome.received_any_content {
                    self.lock().retry_count += 1;
                }
                SubmitOutcome::Completed { turn_id, outcome }
            }
            Err(e) if e.is_cancelled() => {
                self.settle_turn(turn_id, None);
                SubmitOutcome::Cancelled
            }
            Err(e) => {
                tracing::warn!(target: "chatline.session", error = %e, "request failed");
                let message = e.to_string();
                self.lock().last_error = Some(message.clone());
                self.inner.observer.on_error(&e);
                self.settle_turn(turn_id, Some(language.failure_message().to_string()));
                SubmitOutcome::Failed {
                    turn_id,
                    error: message,
                }
            }
        }
    }

    /// Run the search tool turn. A failed search yields its notice as the
    /// tool result so the model can tell the user; `Err` only on cancellation.
    async fn run_search(
        &self,
        search: &dyn WebSearch,
        query: &str,
        token: &CancellationToken,
    ) -> Result<ToolResult> {
        let language = self.language();
        let pending = ConversationTurn::pending_tool(search.name(), language.searching_notice());
        let tool_turn = pending.id;
        self.append(pending);

        let request = search.request(query);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = search.search(&request) => Some(result),
        };

        match result {
            None => {
                self.settle_turn(tool_turn, None);
                Err(ChatError::Cancelled)
            }
            Some(Ok(response)) => {
                let text = format_results(&response, language);
                self.settle_turn(tool_turn, Some(text.clone()));
                Ok(ToolResult::new(search.name(), text))
            }
            Some(Err(e)) => {
                tracing::warn!(target: "chatline.search", error = %e, "search failed, passing the notice to the model");
                let notice = failure_notice(&e, language);
                self.settle_turn(tool_turn, Some(notice.clone()));
                Ok(ToolResult::new(search.name(), notice))
            }
        }
    }

    async fn stream_reply(
        &self,
        request: &ComposedRequest,
        turn_id: TurnId,
        token: &CancellationToken,
    ) -> Result<StreamOutcome> {
        let response = self.inner.dispatcher.send(request, token).await?;

        let consumer = StreamConsumer::new(StreamConfig::new(
            self.inner.options.response_timeout,
            self.language(),
        ));
        let observer = &self.inner.observer;

        consumer
            .consume(
                response.bytes_stream(),
                &request.model_id,
                token,
                |text| {
                    if let Some(turn) = self.update(turn_id, |turn| turn.text = text.to_string()) {
                        observer.on_turn_updated(&turn);
                    }
                },
                |settlement| {
                    let settled = self.update(turn_id, |turn| {
                        turn.is_streaming = false;
                        turn.model_id = Some(settlement.model_id.clone());
                        // a cancelled reply keeps whatever text it had
                        if settlement.reason != SettleReason::Cancelled {
                            turn.text = settlement.text.clone();
                        }
                    });
                    if let Some(turn) = settled {
                        observer.on_turn_settled(&turn);
                    }
                },
            )
            .await
    }

    /// Abort the active request, if any. Returns whether one was active.
    pub fn cancel(&self) -> bool {
        let active = self.lock().active.take();
        match active {
            Some(active) => {
                tracing::info!(target: "chatline.session", generation = active.generation, "cancelling request");
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel any active request and start over with only the greeting turn.
    pub fn reset(&self) {
        self.cancel();
        let turns = vec![ConversationTurn::assistant(self.language().greeting())];
        {
            let mut state = self.lock();
            state.turns = turns.clone();
            state.retry_count = 0;
            state.last_error = None;
        }
        tracing::debug!(target: "chatline.session", "session reset");
        self.inner.observer.on_reset(&turns);
    }

    /// Snapshot of the conversation log
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.lock().turns.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().active.is_some()
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn model(&self) -> String {
        self.lock().model_id.clone()
    }

    /// Model for subsequent requests
    pub fn set_model(&self, model_id: impl Into<String>) {
        self.lock().model_id = model_id.into();
    }

    /// Custom system prompt; None restores the localized default
    pub fn set_system_prompt(&self, prompt: Option<String>) {
        self.lock().system_prompt = prompt;
    }

    pub fn search_enabled(&self) -> bool {
        self.lock().search_enabled
    }

    pub fn set_search_enabled(&self, enabled: bool) {
        self.lock().search_enabled = enabled;
    }

    /// Whether a search tool is configured at all
    pub fn search_available(&self) -> bool {
        self.inner.search.is_some()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }
}
