//! API endpoint integration tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use clarify_api::{router::create_router, sessions::SessionStore, state::AppState};
use clarify_core::{
    alignment::WordTiming,
    dialogue::Turn,
    llm_client::{GenerationError, LLMClient},
    orchestrator::TurnOrchestrator,
    speech::{SpeechSynthesizer, Synthesis, SynthesisError},
};
use serde_json::{Value, json};
use tower::ServiceExt;

const SYSTEM_PROMPT: &str = "You are a helpful tutor.";

/// Replies with scripted responses in order and records every request.
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LLMClient for ScriptedLlm {
    async fn generate(&self, turns: &[Turn]) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(turns.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::NoChoices))
    }
}

/// Takes a while to answer and records how many generations overlapped.
#[derive(Default)]
struct SlowLlm {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl LLMClient for SlowLlm {
    async fn generate(&self, turns: &[Turn]) -> Result<String, GenerationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("ok {}", turns.len()))
    }
}

/// Returns fixed audio and a timing for the first word only.
struct StubTts {
    fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for StubTts {
    async fn synthesize(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        if self.fail {
            return Err(SynthesisError::Provider {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(Synthesis {
            audio: b"mp3".to_vec(),
            timings: text
                .split_whitespace()
                .take(1)
                .map(|w| WordTiming::new(w, 100))
                .collect(),
        })
    }
}

fn build_test_router(llm: Arc<dyn LLMClient>, tts_fails: bool) -> axum::Router {
    let orchestrator = TurnOrchestrator::new(llm, Arc::new(StubTts { fail: tts_fails }));
    let state = Arc::new(AppState {
        sessions: Arc::new(SessionStore::new()),
        orchestrator: Arc::new(orchestrator),
        system_prompt: Arc::new(SYSTEM_PROMPT.to_string()),
    });
    create_router(state)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(json) => request.body(Body::from(json.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_session(app: &axum::Router) -> String {
    let (status, json) = send(app, "POST", "/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    json["session_id"].as_str().unwrap().to_string()
}

async fn history(app: &axum::Router, id: &str) -> Vec<Value> {
    let (status, json) = send(app, "GET", &format!("/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    json["turns"].as_array().unwrap().clone()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router(ScriptedLlm::new(vec![]), false);
    let (status, json) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_new_session_is_seeded_with_system_prompt() {
    let app = build_test_router(ScriptedLlm::new(vec![]), false);
    let id = create_session(&app).await;

    let turns = history(&app, &id).await;
    assert_eq!(turns, vec![json!({"role": "system", "content": SYSTEM_PROMPT})]);
}

#[tokio::test]
async fn test_turn_and_feedback_flow() {
    let llm = ScriptedLlm::new(vec![
        Ok("hello world".to_string()),
        Ok("World means planet.".to_string()),
    ]);
    let app = build_test_router(llm.clone(), false);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/get_response"),
        Some(json!({"user_input": "Say hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chatgpt_response"], "hello[100ms] world");
    assert_eq!(json["audio_data"], "bXAz");

    let (status, json) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/submit_comprehension_feedback"),
        Some(json!({
            "word_comprehension": [10, "5"],
            "assistant_response": "hello[100ms] world"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "status": "success",
            "explanation": "World[100ms] means planet.",
            "audio_data": "bXAz"
        })
    );

    let turns = history(&app, &id).await;
    let roles: Vec<&str> = turns.iter().map(|t| t["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user", "assistant"]);
    assert_eq!(
        turns[3]["content"],
        "The user did not fully understand the following terms: world. Please explain these terms."
    );

    let requests = llm.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].len(), 4);
}

#[tokio::test]
async fn test_feedback_with_invalid_scores_returns_nulls() {
    let app = build_test_router(ScriptedLlm::new(vec![]), false);
    let id = create_session(&app).await;

    for body in [
        json!({"word_comprehension": ["a", "b"], "assistant_response": "hello world"}),
        json!({"word_comprehension": [1, 2, 3], "assistant_response": "hello[100ms] world"}),
        json!({"word_comprehension": [10, 10], "assistant_response": "hello[100ms] world"}),
        json!({}),
    ] {
        let (status, json) = send(
            &app,
            "POST",
            &format!("/sessions/{id}/submit_comprehension_feedback"),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({"status": "success", "explanation": null, "audio_data": null})
        );
    }

    assert_eq!(history(&app, &id).await.len(), 1);
}

#[tokio::test]
async fn test_feedback_synthesis_failure_returns_text_without_audio() {
    let llm = ScriptedLlm::new(vec![Ok("Casa  means house.".to_string())]);
    let app = build_test_router(llm, true);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/submit_comprehension_feedback"),
        Some(json!({"word_comprehension": [0], "assistant_response": "casa[0ms]"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["explanation"], "Casa means house.");
    assert_eq!(json["audio_data"], Value::Null);
}

#[tokio::test]
async fn test_generation_failure_is_reported_generically() {
    let app = build_test_router(ScriptedLlm::new(vec![Err(GenerationError::Empty)]), false);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/get_response"),
        Some(json!({"user_input": "Hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json,
        json!({"error": "Failed to get a response from the language model"})
    );

    let turns = history(&app, &id).await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1], json!({"role": "user", "content": "Hi"}));
}

#[tokio::test]
async fn test_synthesis_failure_fails_the_turn() {
    let llm = ScriptedLlm::new(vec![Ok("Bonjour".to_string())]);
    let app = build_test_router(llm, true);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/get_response"),
        Some(json!({"user_input": "Hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json, json!({"error": "Failed to convert text to speech"}));
    assert_eq!(history(&app, &id).await.len(), 3);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = build_test_router(ScriptedLlm::new(vec![]), false);
    let id = "550e8400-e29b-41d4-a716-446655440000";

    let (status, json) = send(&app, "GET", &format!("/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains(id));

    let (status, _) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/get_response"),
        Some(json!({"user_input": "Hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_and_reset_session() {
    let llm = ScriptedLlm::new(vec![Ok("hola".to_string())]);
    let app = build_test_router(llm, false);
    let id = create_session(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/get_response"),
        Some(json!({"user_input": "Hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history(&app, &id).await.len(), 3);

    let (status, json) = send(&app, "POST", &format!("/sessions/{id}/reset"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["turns"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_turns_on_one_session_never_interleave() {
    let llm = Arc::new(SlowLlm::default());
    let app = build_test_router(llm.clone(), false);
    let id = create_session(&app).await;

    let mut requests = Vec::new();
    for i in 0..8 {
        let app = app.clone();
        let uri = format!("/sessions/{id}/get_response");
        requests.push(tokio::spawn(async move {
            send(&app, "POST", &uri, Some(json!({"user_input": format!("question {i}")}))).await
        }));
    }
    let app_for_feedback = app.clone();
    let uri = format!("/sessions/{id}/submit_comprehension_feedback");
    requests.push(tokio::spawn(async move {
        send(
            &app_for_feedback,
            "POST",
            &uri,
            Some(json!({"word_comprehension": [0], "assistant_response": "ok[100ms]"})),
        )
        .await
    }));

    for request in requests {
        let (status, _) = request.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(llm.max_in_flight.load(Ordering::SeqCst), 1);

    let turns = history(&app, &id).await;
    assert_eq!(turns.len(), 1 + 9 * 2);
    assert_eq!(turns[0]["role"], "system");
    for (i, pair) in turns[1..].chunks(2).enumerate() {
        assert_eq!(pair[0]["role"], "user", "turn pair {i}");
        assert_eq!(pair[1]["role"], "assistant", "turn pair {i}");
        // Each reply was generated from exactly the history before it.
        assert_eq!(pair[1]["content"], format!("ok {}", 2 * i + 2));
    }
}

#[tokio::test]
async fn test_unreadable_feedback_body_returns_nulls() {
    let app = build_test_router(ScriptedLlm::new(vec![]), false);
    let id = create_session(&app).await;
    let uri = format!("/sessions/{id}/submit_comprehension_feedback");

    for body in [
        r#"{"word_comprehension": null, "assistant_response": "hello world"}"#,
        r#"{"word_comprehension": "10 5", "assistant_response": "hello world"}"#,
        r#"{"word_comprehension": [10, 5], "assistant_response": 42}"#,
        "not json",
    ] {
        let request = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "body: {body}");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            json!({"status": "success", "explanation": null, "audio_data": null})
        );
    }

    assert_eq!(history(&app, &id).await.len(), 1);
}
