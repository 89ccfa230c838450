// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! Reads an SSE byte stream from a chat-completion endpoint, reports the
//! growing text through a callback and settles exactly once. A stream
//! settles on `[DONE]`, end of input, cancellation, a hard read error, or
//! one of two timeouts: no bytes for the idle window, or no content at all
//! within the no-content window since the stream started.

use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::chat::locale::Language;
use crate::error::{ApiError, Result};

/// Default idle and no-content window
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(20_000);

const DONE_SENTINEL: &str = "[DONE]";

/// Timeouts and fallback text for a stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Settle when no bytes arrive for this long
    pub idle_timeout: Duration,
    /// Settle when no content has arrived this long after the stream started
    pub no_content_timeout: Duration,
    /// Final text when the stream produced no content
    pub fallback_text: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(RESPONSE_TIMEOUT, Language::default())
    }
}

impl StreamConfig {
    /// Both windows set to `response_timeout`, fallback in `language`
    pub fn new(response_timeout: Duration, language: Language) -> Self {
        Self {
            idle_timeout: response_timeout,
            no_content_timeout: response_timeout,
            fallback_text: language.no_answer_fallback().to_string(),
        }
    }
}

/// Why a stream settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
    /// `[DONE]` sentinel received
    Done,
    /// Byte stream ended
    EndOfStream,
    IdleTimeout,
    NoContentTimeout,
    Cancelled,
    ReadError,
}

impl SettleReason {
    /// Stream ended the way the protocol intends
    pub fn is_clean(&self) -> bool {
        matches!(self, SettleReason::Done | SettleReason::EndOfStream)
    }
}

/// Final state handed to `on_settle`
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Accumulated text, or the fallback when nothing arrived
    pub text: String,
    /// Last model the server reported, else the requested one
    pub model_id: String,
    pub received_any_content: bool,
    pub reason: SettleReason,
    /// Data lines that were not valid chunk JSON
    pub skipped_chunks: usize,
}

/// Returned by `StreamConsumer::consume` unless a hard read error occurred
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// Settled on `[DONE]` or end of stream
    pub ok: bool,
    pub received_any_content: bool,
    pub model_id_used: String,
    pub reason: SettleReason,
    pub skipped_chunks: usize,
}

/// One decoded SSE line of interest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Lines may be split across chunks at any byte, including inside a
/// multi-byte character; incomplete lines are held until their newline
/// arrives. Comments (`:`), `event:` and `id:` lines and blank lines are
/// dropped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every complete event it finishes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&rest).into_iter().collect()
    }

    fn decode_line(line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let payload = line.trim().strip_prefix("data:")?.trim();
        if payload.is_empty() {
            None
        } else if payload == DONE_SENTINEL {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(payload.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Accumulated state of one stream
#[derive(Debug, Default)]
struct StreamAccumulator {
    text: String,
    model_id: Option<String>,
    received_any_content: bool,
    skipped_chunks: usize,
}

impl StreamAccumulator {
    /// Apply one data payload; true when it carried new content
    fn apply(&mut self, payload: &str) -> bool {
        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.skipped_chunks += 1;
                let preview: String = payload.chars().take(120).collect();
                tracing::warn!(
                    target: "chatline.stream",
                    error = %e,
                    payload = %preview,
                    "skipping malformed chunk"
                );
                return false;
            }
        };

        if let Some(model) = chunk.model.filter(|m| !m.is_empty()) {
            if self.model_id.as_deref() != Some(model.as_str()) {
                tracing::debug!(target: "chatline.stream", model = %model, "model reported");
                self.model_id = Some(model);
            }
        }

        let fragment = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty());

        match fragment {
            Some(fragment) => {
                self.text.push_str(&fragment);
                self.received_any_content = true;
                true
            }
            None => false,
        }
    }

    fn settle(&self, reason: SettleReason, requested_model: &str, fallback_text: &str) -> Settlement {
        let text = if self.received_any_content {
            self.text.clone()
        } else {
            fallback_text.to_string()
        };
        Settlement {
            text,
            model_id: self
                .model_id
                .clone()
                .unwrap_or_else(|| requested_model.to_string()),
            received_any_content: self.received_any_content,
            reason,
            skipped_chunks: self.skipped_chunks,
        }
    }
}

/// Consumes one streamed chat-completion response
#[derive(Debug, Clone, Default)]
pub struct StreamConsumer {
    config: StreamConfig,
}

impl StreamConsumer {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Read `stream` to settlement.
    ///
    /// `requested_model` is reported as the model used unless the server
    /// names one; a later non-empty name replaces an earlier one.
    /// `on_delta` receives the full accumulated text after every content
    /// fragment. `on_settle` is called exactly once on every path, a hard
    /// read error included; that error is returned afterwards.
    pub async fn consume<S, B, E, D, F>(
        &self,
        stream: S,
        requested_model: &str,
        cancel: &CancellationToken,
        mut on_delta: D,
        on_settle: F,
    ) -> Result<StreamOutcome>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
        D: FnMut(&str),
        F: FnOnce(&Settlement),
    {
        let mut stream = std::pin::pin!(stream);
        let mut accumulator = StreamAccumulator::default();

        let result = self
            .read_to_end(&mut stream, cancel, &mut accumulator, &mut on_delta)
            .await;

        let reason = match &result {
            Ok(reason) => *reason,
            Err(_) => SettleReason::ReadError,
        };
        let settlement = accumulator.settle(reason, requested_model, &self.config.fallback_text);

        match reason {
            SettleReason::Done | SettleReason::EndOfStream => tracing::debug!(
                target: "chatline.stream",
                reason = ?reason,
                chars = settlement.text.chars().count(),
                skipped = settlement.skipped_chunks,
                "stream settled"
            ),
            SettleReason::IdleTimeout | SettleReason::NoContentTimeout | SettleReason::Cancelled => {
                tracing::info!(
                    target: "chatline.stream",
                    reason = ?reason,
                    received_content = settlement.received_any_content,
                    skipped = settlement.skipped_chunks,
                    "stream settled early"
                )
            }
            SettleReason::ReadError => tracing::warn!(
                target: "chatline.stream",
                received_content = settlement.received_any_content,
                skipped = settlement.skipped_chunks,
                "stream read failed"
            ),
        }

        on_settle(&settlement);

        result.map(|reason| StreamOutcome {
            ok: reason.is_clean(),
            received_any_content: settlement.received_any_content,
            model_id_used: settlement.model_id,
            reason,
            skipped_chunks: settlement.skipped_chunks,
        })
    }

    async fn read_to_end<S, B, E, D>(
        &self,
        stream: &mut S,
        cancel: &CancellationToken,
        accumulator: &mut StreamAccumulator,
        on_delta: &mut D,
    ) -> Result<SettleReason>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
        D: FnMut(&str),
    {
        let started = Instant::now();
        let no_content_deadline = started + self.config.no_content_timeout;
        let mut last_activity = started;
        let mut decoder = SseDecoder::new();

        loop {
            if cancel.is_cancelled() {
                return Ok(SettleReason::Cancelled);
            }

            let idle_deadline = last_activity + self.config.idle_timeout;
            let deadline = if accumulator.received_any_content {
                idle_deadline
            } else {
                idle_deadline.min(no_content_deadline)
            };

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SettleReason::Cancelled),
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            let events = match next {
                Err(_elapsed) => {
                    let reason = if !accumulator.received_any_content
                        && Instant::now() >= no_content_deadline
                    {
                        SettleReason::NoContentTimeout
                    } else {
                        SettleReason::IdleTimeout
                    };
                    return Ok(reason);
                }
                Ok(None) => {
                    for event in decoder.finish() {
                        if self.handle_event(event, accumulator, on_delta) {
                            return Ok(SettleReason::Done);
                        }
                    }
                    return Ok(SettleReason::EndOfStream);
                }
                Ok(Some(Err(e))) => return Err(ApiError::StreamError(e.to_string()).into()),
                Ok(Some(Ok(bytes))) => {
                    last_activity = Instant::now();
                    decoder.push(bytes.as_ref())
                }
            };

            for event in events {
                if self.handle_event(event, accumulator, on_delta) {
                    return Ok(SettleReason::Done);
                }
            }
        }
    }

    /// True when the event ends the stream
    fn handle_event<D: FnMut(&str)>(
        &self,
        event: SseEvent,
        accumulator: &mut StreamAccumulator,
        on_delta: &mut D,
    ) -> bool {
        match event {
            SseEvent::Done => true,
            SseEvent::Data(payload) => {
                if accumulator.apply(&payload) {
                    on_delta(&accumulator.text);
                }
                false
            }
        }
    }
}
