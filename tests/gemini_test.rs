//! Integration tests for the Gemini client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use futures_util::StreamExt;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use knowledge_atlas::config::{GeminiConfig, RequestConfig};
use knowledge_atlas::error::GeminiError;
use knowledge_atlas::gemini::GeminiClient;
use knowledge_atlas::generation::CredentialChain;

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";
const STREAM_PATH: &str = "/v1beta/models/gemini-2.5-flash:streamGenerateContent";

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, credentials: CredentialChain) -> GeminiClient {
    let config = GeminiConfig {
        api_key: None,
        base_url: base_url.to_string(),
        model: "gemini-2.5-flash".to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: Some(5000),
        max_retries: 3,
        retry_delay_ms: 10,
    };

    GeminiClient::new(&config, request_config, credentials).expect("Failed to create client")
}

fn text_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }]
    })
}

#[cfg(test)]
mod generate_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_generate() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("hello there")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("test-key"));
        let text = client.generate("Say hello").await;

        assert!(text.is_ok(), "generate should succeed: {:?}", text.err());
        assert_eq!(text.unwrap(), "hello there");

        let requests = mock_server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body, json!({"contents": [{"parts": [{"text": "Say hello"}]}]}));
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("never")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::empty());
        let result = client.generate("prompt").await;

        assert!(matches!(result, Err(GeminiError::MissingCredential)));
    }

    #[tokio::test]
    async fn test_rate_limit_retried_then_succeeds() {
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
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("third time")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        assert_eq!(client.generate("p").await.unwrap(), "third time");
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        let result = client.generate("p").await;

        assert!(matches!(result, Err(GeminiError::RateLimited { retries: 3 })));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": 500, "message": "Internal error", "status": "INTERNAL" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        match client.generate("p").await {
            Err(GeminiError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "Internal error");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_payload_is_protocol_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "message": "API key not valid" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        let result = client.generate("p").await;

        assert!(
            matches!(&result, Err(GeminiError::Protocol { message }) if message == "API key not valid"),
            "unexpected result: {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        let result = client.generate("p").await;

        assert!(matches!(result, Err(GeminiError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_non_json_body_is_protocol_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        let result = client.generate("p").await;

        assert!(matches!(result, Err(GeminiError::Protocol { .. })));
    }
}

#[cfg(test)]
mod stream_tests {
    use super::*;

    fn sse_event(payload: Value) -> String {
        format!("data: {}\n\n", payload)
    }

    #[tokio::test]
    async fn test_stream_yields_text_deltas() {
        let mock_server = MockServer::start().await;

        let body = [
            sse_event(text_body("**Tides")),
            sse_event(json!({ "candidates": [{ "finishReason": "STOP" }] })),
            sse_event(text_body(" rise**\n- moon")),
        ]
        .concat();

        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "k"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        let mut stream = client.stream_generate("p").await.unwrap();

        let mut deltas = Vec::new();
        while let Some(delta) = stream.next().await {
            deltas.push(delta.unwrap());
        }

        assert_eq!(deltas, vec!["**Tides".to_string(), " rise**\n- moon".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_error_event() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(STREAM_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_event(json!({ "error": { "message": "overloaded" } }))),
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), CredentialChain::with_key("k"));
        let mut stream = client.stream_generate("p").await.unwrap();

        let first = stream.next().await.expect("one item");
        assert!(matches!(first, Err(GeminiError::Protocol { .. })));
    }
}
