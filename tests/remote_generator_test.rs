//! Integration tests for the remote generator
//!
//! Drives prompt building, JSON extraction, 429 backoff and quality-gate
//! retries against a wiremock Gemini endpoint.

use serde_json::{json, Value};
use std::time::{Duration, Instant};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use knowledge_atlas::config::{GeminiConfig, RequestConfig};
use knowledge_atlas::error::{GeminiError, GenerationError};
use knowledge_atlas::gemini::GeminiClient;
use knowledge_atlas::generation::{
    BranchItem, BranchType, CredentialChain, GenerationProvider, NodeContext, PathType,
    RemoteGenerator,
};
use knowledge_atlas::prompts::RETRY_INSTRUCTION;

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn create_generator(base_url: &str, retry_delay_ms: u64) -> RemoteGenerator {
    let config = GeminiConfig {
        api_key: None,
        base_url: base_url.to_string(),
        model: "gemini-2.5-flash".to_string(),
    };
    let request_config = RequestConfig {
        timeout_ms: Some(10_000),
        max_retries: 3,
        retry_delay_ms,
    };
    let client = GeminiClient::new(&config, request_config, CredentialChain::with_key("test-key"))
        .expect("Failed to create client");
    RemoteGenerator::new(client, 2)
}

/// Gemini response whose text is the given payload serialized as JSON.
fn completion(payload: &Value) -> ResponseTemplate {
    completion_text(&payload.to_string())
}

fn completion_text(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    }))
}

fn happy_path_payload() -> Value {
    json!({
        "rootQuestion": "Why does X work this way?",
        "branches": [
            { "question": "What underlying mechanism drives this effect across contexts?", "context": "c1" },
            { "question": "What would happen if the core constraint were removed entirely?", "context": "c2" }
        ]
    })
}

async fn prompts_sent(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["contents"][0]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_happy_path_returned_unmodified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&happy_path_payload()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let result = generator
        .generate_path_questions("text", PathType::Clarify)
        .await
        .unwrap();

    assert_eq!(result.root_question, "Why does X work this way?");
    assert_eq!(
        result.branches,
        vec![
            BranchItem::new("What underlying mechanism drives this effect across contexts?", "c1"),
            BranchItem::new("What would happen if the core constraint were removed entirely?", "c2"),
        ]
    );

    let prompts = prompts_sent(&mock_server).await;
    assert!(prompts[0].contains("\"clarify\""));
    assert!(!prompts[0].contains(RETRY_INSTRUCTION));
}

#[tokio::test]
async fn test_rate_limit_backoff_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&happy_path_payload()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 1000);
    let start = Instant::now();
    let result = generator
        .generate_path_questions("text", PathType::Clarify)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(result.root_question, "Why does X work this way?");
    assert!(
        elapsed >= Duration::from_millis(3000),
        "expected 1s + 2s backoff, waited {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_quality_rejection_then_accept() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&json!([
            { "question": "Is this real?", "context": "weak" },
            { "question": "How could the same pattern show up in a completely different field?", "context": "ok" }
        ])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&json!([
            { "question": "Which observations would convince a skeptic that this effect is genuine?", "context": "evidence" },
            { "question": "How would the outcome change if the main actors had different incentives?", "context": "incentives" }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let node = NodeContext::new(
        "How do tides depend on the moon's position?",
        PathType::GoDeeper,
        "Tides follow the moon.",
    );
    let branches = generator
        .generate_branches(&node, BranchType::Question)
        .await
        .unwrap();

    assert_eq!(
        branches[0].question,
        "Which observations would convince a skeptic that this effect is genuine?"
    );

    let prompts = prompts_sent(&mock_server).await;
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains(RETRY_INSTRUCTION));
    assert!(prompts[1].ends_with(RETRY_INSTRUCTION));
    assert!(prompts[1].starts_with(&prompts[0]));
}

#[tokio::test]
async fn test_weak_results_accepted_after_retries_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&json!([
            { "question": "Is it true?", "context": "weak" }
        ])))
        .expect(3)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let node = NodeContext::new("Why?", PathType::Challenge, "src");
    let branches = generator
        .generate_branches(&node, BranchType::Question)
        .await
        .unwrap();

    assert_eq!(branches, vec![BranchItem::new("Is it true?", "weak")]);
}

#[tokio::test]
async fn test_uniqueness_gate_uses_existing_questions() {
    let mock_server = MockServer::start().await;
    let duplicate = "How would the outcome change if the main actors had different incentives?";

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&json!([{ "question": duplicate, "context": "dup" }])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&json!([
            { "question": "Which historical example best illustrates this dynamic playing out at scale?", "context": "fresh" }
        ])))
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let node = NodeContext::new("Why?", PathType::Apply, "src")
        .with_existing_questions(vec![duplicate.to_string()]);
    let branches = generator
        .generate_branches(&node, BranchType::Question)
        .await
        .unwrap();

    assert_eq!(branches[0].context, "fresh");
}

#[tokio::test]
async fn test_answer_is_not_quality_gated_and_strips_fences() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion_text(
            "```json\n{\"summary\":\"Gravity and inertia.\",\"bullets\":[\"Moon\",\"Sun\"]}\n```",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let node = NodeContext::new("Is it the moon?", PathType::Clarify, "Tides");
    let answer = generator.generate_answer(&node).await.unwrap();

    assert_eq!(answer.summary, "Gravity and inertia.");
    assert_eq!(answer.bullets, vec!["Moon".to_string(), "Sun".to_string()]);
}

#[tokio::test]
async fn test_shape_mismatch_fails_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(completion(&json!({ "rootQuestion": 42, "branches": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let result = generator
        .generate_path_questions("text", PathType::Surprise)
        .await;

    assert!(matches!(result, Err(GenerationError::Shape { .. })));
}

#[tokio::test]
async fn test_transport_failure_surfaces_as_remote_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let node = NodeContext::new("Why?", PathType::Apply, "src");
    let result = generator.generate_answer(&node).await;

    assert!(matches!(
        result,
        Err(GenerationError::Remote(GeminiError::Api { status: 403, .. }))
    ));
}

#[tokio::test]
async fn test_stream_answer_parses_layout() {
    let mock_server = MockServer::start().await;

    let events = [
        "**Tides come from ",
        "gravity**\n- The moon pulls the oceans\n",
        "- The sun adds a smaller pull\n  that varies by season",
    ]
    .iter()
    .map(|text| {
        format!(
            "data: {}\n\n",
            json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
        )
    })
    .collect::<String>();

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:streamGenerateContent"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(events),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = create_generator(&mock_server.uri(), 10);
    let node = NodeContext::new("Why tides?", PathType::GoDeeper, "Tides");
    let answer = generator.stream_answer(&node).await.unwrap();

    assert_eq!(answer.summary, "Tides come from gravity");
    assert_eq!(
        answer.bullets,
        vec![
            "The moon pulls the oceans".to_string(),
            "The sun adds a smaller pull that varies by season".to_string(),
        ]
    );
}
