// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatline::chat::{ChatSession, Language, SessionObserver, SettleReason, SubmitOutcome};
use chatline::error::{ChatError, Result};
use chatline::llm::message::{ConversationTurn, Role};
use chatline::llm::{Dispatcher, ProviderEndpoint, RetryPolicy};
use chatline::tools::search::{SearchHit, SearchRequest, SearchResponse, WebSearch};

const CHAT_PATH: &str = "/v1/chat/completions";

fn sse_body(model: &str, fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = serde_json::json!({
            "model": model,
            "choices": [{"delta": {"content": fragment}}]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(fragments: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body("served/model", fragments), "text/event-stream")
}

fn dispatcher_for(server: &MockServer) -> Dispatcher {
    let endpoint = ProviderEndpoint::openrouter("test-key")
        .with_url(format!("{}{}", server.uri(), CHAT_PATH));
    Dispatcher::new(
        endpoint,
        RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(10),
        },
    )
}

fn session_for(server: &MockServer) -> ChatSession {
    ChatSession::builder(dispatcher_for(server))
        .with_language(Language::En)
        .with_model("test/model")
        .build()
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_turn_appended(&self, turn: &ConversationTurn) {
        self.events.lock().unwrap().push(format!("append:{}", turn.role));
    }

    fn on_turn_updated(&self, turn: &ConversationTurn) {
        self.events.lock().unwrap().push(format!("update:{}", turn.text));
    }

    fn on_turn_settled(&self, turn: &ConversationTurn) {
        self.events.lock().unwrap().push(format!("settle:{}", turn.text));
    }

    fn on_error(&self, _error: &ChatError) {
        self.events.lock().unwrap().push("error".to_string());
    }
}

struct FakeSearch {
    fail: bool,
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        if self.fail {
            return Err(ChatError::ToolCallFailed("search failed (500): boom".to_string()));
        }
        Ok(SearchResponse {
            answer: Some(format!("About {}", request.query)),
            results: vec![SearchHit {
                title: "Result".to_string(),
                url: "https://example.com/r".to_string(),
                content: "Snippet".to_string(),
                score: 0.8,
                published_date: None,
                raw_content: None,
            }],
        })
    }
}

#[tokio::test]
async fn test_streamed_reply_fills_assistant_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["A", "B"]))
        .expect(1)
        .mount(&server)
        .await;

    let observer = Arc::new(RecordingObserver::default());
    let session = ChatSession::builder(dispatcher_for(&server))
        .with_language(Language::En)
        .with_model("test/model")
        .with_observer(observer.clone())
        .build();

    let outcome = session.submit("Hi").await;
    let turn_id = match outcome {
        SubmitOutcome::Completed { turn_id, outcome } => {
            assert!(outcome.ok);
            assert!(outcome.received_any_content);
            assert_eq!(outcome.reason, SettleReason::Done);
            assert_eq!(outcome.model_id_used, "served/model");
            turn_id
        }
        other => panic!("Expected Completed, got {:?}", other),
    };

    let turns = session.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].role, Role::User);
    assert_eq!(turns[1].text, "Hi");
    let reply = &turns[2];
    assert_eq!(reply.id, turn_id);
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.text, "AB");
    assert!(!reply.is_streaming);
    assert_eq!(reply.model_id.as_deref(), Some("served/model"));
    assert!(!session.is_busy());
    assert_eq!(session.retry_count(), 0);

    assert_eq!(
        observer.events(),
        vec![
            "append:user",
            "append:assistant",
            "update:A",
            "update:AB",
            "settle:AB",
        ]
    );

    let bodies = request_bodies(&server).await;
    let body = &bodies[0];
    assert_eq!(body["model"], "test/model");
    assert_eq!(body["stream"], true);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], Language::En.default_system_prompt());
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], Language::En.greeting());
    assert_eq!(messages.last().unwrap()["content"], "Hi");
}

#[tokio::test]
async fn test_followup_includes_previous_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["AB"]))
        .mount(&server)
        .await;

    let session = session_for(&server);
    session.submit("first").await;
    session.submit("second").await;

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    let contents: Vec<&str> = bodies[1]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(
        &contents[1..],
        &[Language::En.greeting(), "first", "AB", "second"]
    );
}

#[tokio::test]
async fn test_context_window_limits_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["ok"]))
        .mount(&server)
        .await;

    let session = ChatSession::builder(dispatcher_for(&server))
        .with_language(Language::En)
        .with_context_window(2)
        .build();
    session.submit("one").await;
    session.submit("two").await;

    let bodies = request_bodies(&server).await;
    let roles: Vec<&str> = bodies[1]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    // system, last two turns ("one", "ok"), then the new input
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
}

#[tokio::test]
async fn test_cancel_then_replace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["stale"]).set_delay(Duration::from_secs(5)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["A", "B"]))
        .with_priority(2)
        .mount(&server)
        .await;

    let session = session_for(&server);
    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.submit("first").await })
    };

    // wait until the first request is in flight
    for _ in 0..200 {
        if server.received_requests().await.unwrap_or_default().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(session.is_busy());
    assert_eq!(session.submit("ignored").await, SubmitOutcome::Ignored);

    assert!(session.cancel());
    let second = session.submit("second").await;
    assert!(matches!(second, SubmitOutcome::Completed { .. }));
    assert_eq!(first.await.unwrap(), SubmitOutcome::Cancelled);

    let turns = session.turns();
    let assistants: Vec<&ConversationTurn> = turns
        .iter()
        .skip(1)
        .filter(|t| t.role == Role::Assistant)
        .collect();
    assert_eq!(assistants.len(), 2);
    assert_eq!(assistants[0].text, "");
    assert_eq!(assistants[1].text, "AB");
    assert!(turns.iter().all(|t| !t.is_streaming));
    assert!(turns.iter().all(|t| t.text != "stale"));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_failed_request_shows_failure_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": {"message": "down"}})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let observer = Arc::new(RecordingObserver::default());
    let session = ChatSession::builder(dispatcher_for(&server))
        .with_language(Language::En)
        .with_observer(observer.clone())
        .build();

    let outcome = session.submit("Hi").await;
    let error = match outcome {
        SubmitOutcome::Failed { error, .. } => error,
        other => panic!("Expected Failed, got {:?}", other),
    };
    assert!(error.contains("down"));
    assert_eq!(session.last_error(), Some(error));

    let turns = session.turns();
    let reply = turns.last().unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.text, Language::En.failure_message());
    assert!(!reply.is_streaming);
    assert!(observer.events().contains(&"error".to_string()));

    // session stays usable
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_empty_stream_uses_fallback_and_counts_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("data: {\"choices\":[]}\n\ndata: [DONE]\n\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let session = session_for(&server);
    match session.submit("Hi").await {
        SubmitOutcome::Completed { outcome, .. } => {
            assert!(outcome.ok);
            assert!(!outcome.received_any_content);
        }
        other => panic!("Expected Completed, got {:?}", other),
    }
    assert_eq!(session.retry_count(), 1);
    assert_eq!(
        session.turns().last().unwrap().text,
        Language::En.no_answer_fallback()
    );
}

#[tokio::test]
async fn test_search_results_feed_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["Answer"]))
        .mount(&server)
        .await;

    let session = ChatSession::builder(dispatcher_for(&server))
        .with_language(Language::En)
        .with_search(Arc::new(FakeSearch { fail: false }))
        .with_search_enabled(true)
        .build();
    assert!(session.search_available());

    session.submit("weather").await;

    let turns = session.turns();
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::Assistant, Role::User, Role::Tool, Role::Assistant]
    );
    let tool = &turns[2];
    assert_eq!(tool.tool_name.as_deref(), Some("tavily_search"));
    assert!(tool.text.contains("About weather"));
    assert!(!tool.is_streaming);

    let bodies = request_bodies(&server).await;
    let messages = bodies[0]["messages"].as_array().unwrap();
    let system = messages[0]["content"].as_str().unwrap();
    assert!(system.ends_with(Language::En.search_instruction()));
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "tool");
    assert_eq!(last["name"], "tavily_search");
    assert!(last["content"].as_str().unwrap().contains("About weather"));
}

#[tokio::test]
async fn test_failed_search_notice_feeds_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["Answer"]))
        .mount(&server)
        .await;

    let session = ChatSession::builder(dispatcher_for(&server))
        .with_language(Language::En)
        .with_search(Arc::new(FakeSearch { fail: true }))
        .with_search_enabled(true)
        .build();

    let outcome = session.submit("weather").await;
    assert!(matches!(outcome, SubmitOutcome::Completed { .. }));

    let turns = session.turns();
    assert_eq!(turns[2].text, Language::En.search_failed());
    assert_eq!(turns[3].text, "Answer");

    let bodies = request_bodies(&server).await;
    let messages = bodies[0]["messages"].as_array().unwrap();
    let system = messages[0]["content"].as_str().unwrap();
    assert!(system.ends_with(Language::En.search_instruction()));
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "tool");
    assert_eq!(last["name"], "tavily_search");
    assert_eq!(last["content"], Language::En.search_failed());
}

#[tokio::test]
async fn test_reply_without_model_keeps_requested_model() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let session = session_for(&server);
    match session.submit("Hello").await {
        SubmitOutcome::Completed { outcome, .. } => assert_eq!(outcome.model_id_used, "test/model"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    let reply = session.turns().pop().unwrap();
    assert_eq!(reply.model_id.as_deref(), Some("test/model"));
    assert_eq!(reply.text, "Hi");
}

#[tokio::test]
async fn test_reset_discards_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(sse_response(&["AB"]))
        .mount(&server)
        .await;

    let session = session_for(&server);
    session.submit("Hi").await;
    assert_eq!(session.turns().len(), 3);

    session.reset();
    let turns = session.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].text, Language::En.greeting());
}
