//! Provider adapters against a mock server.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lcaudit::providers::{
    AnthropicProvider, GeminiProvider, OpenAiProvider, ProviderError, ProviderRequest,
    StructuredProvider,
};

fn request() -> ProviderRequest {
    ProviderRequest {
        schema_name: "audit_synthesis".into(),
        system: "Summarise.".into(),
        user: "{}".into(),
        schema: json!({ "type": "object" }),
        images: vec!["https://cdn.test/desktop.png".into()],
    }
}

#[tokio::test]
async fn test_gemini_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"score\": 71}" }] } }],
            "usageMetadata": { "promptTokenCount": 120, "candidatesTokenCount": 30 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(reqwest::Client::new(), "g-key", "test-model")
        .with_base_url(server.uri());
    let value = provider.call(&request()).await.unwrap();
    assert_eq!(value["score"], 71);
}

#[tokio::test]
async fn test_gemini_empty_candidates_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(reqwest::Client::new(), "g-key", "test-model")
        .with_base_url(server.uri());
    let err = provider.call(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::ResponseInvalid(_)));
}

#[tokio::test]
async fn test_openai_success_through_code_fence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer o-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "```json\n{\"score\": 64}\n```" } }],
            "usage": { "prompt_tokens": 200, "completion_tokens": 40 }
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(reqwest::Client::new(), "o-key", "gpt-4o-mini")
        .with_base_url(server.uri());
    assert_eq!(provider.id(), "openai:gpt-4o-mini");
    let value = provider.call(&request()).await.unwrap();
    assert_eq!(value["score"], 64);
}

#[tokio::test]
async fn test_openai_http_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(reqwest::Client::new(), "o-key", "gpt-5")
        .with_base_url(server.uri());
    match provider.call(&request()).await.unwrap_err() {
        ProviderError::Http { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected Http, got {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_refusal_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": null, "refusal": "cannot help" } }]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(reqwest::Client::new(), "o-key", "gpt-5")
        .with_base_url(server.uri());
    let err = provider.call(&request()).await.unwrap_err();
    assert!(err.to_string().contains("cannot help"));
}

#[tokio::test]
async fn test_anthropic_reads_tool_use_block() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "a-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "text", "text": "Here you go." },
                { "type": "tool_use", "input": { "score": 88 } }
            ],
            "usage": { "input_tokens": 300, "output_tokens": 50 }
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(reqwest::Client::new(), "a-key", "claude-test")
        .with_base_url(server.uri());
    let value = provider.call(&request()).await.unwrap();
    assert_eq!(value, json!({ "score": 88 }));
}

#[tokio::test]
async fn test_anthropic_without_tool_use_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "{\"score\": 1}" }]
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(reqwest::Client::new(), "a-key", "claude-test")
        .with_base_url(server.uri());
    let err = provider.call(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::ResponseInvalid(_)));
}
