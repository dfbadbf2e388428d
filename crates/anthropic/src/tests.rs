// Unit tests for the Anthropic generator

use std::time::Duration;

use docket_core::{GenerationError, Retryable, TextGenerator};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{AnthropicConfig, AnthropicGenerator, DEFAULT_MODEL};

async fn generator_for(server: &MockServer) -> AnthropicGenerator {
    AnthropicGenerator::new(
        AnthropicConfig::new("test-key")
            .with_base_url(format!("{}/v1/messages", server.uri()))
            .with_timeout(Duration::from_millis(500)),
    )
    .unwrap()
}

#[test]
fn test_config_defaults() {
    let config = AnthropicConfig::new("test-key");
    assert_eq!(config.model, DEFAULT_MODEL);
    assert_eq!(config.max_tokens, 200);
    assert_eq!(config.timeout, Duration::from_secs(30));
}

#[test]
fn test_debug_redacts_api_key() {
    let generator = AnthropicGenerator::new(AnthropicConfig::new("secret-key")).unwrap();
    let debug = format!("{:?}", generator);
    assert!(debug.contains("AnthropicGenerator"));
    assert!(!debug.contains("secret-key"));
}

#[test]
fn test_blank_key_is_unconfigured() {
    let err = AnthropicGenerator::new(AnthropicConfig::new("  ")).unwrap_err();
    assert_eq!(err, GenerationError::Unconfigured);
}

#[tokio::test]
async fn test_generate_returns_first_text_block() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": DEFAULT_MODEL,
            "max_tokens": 200,
            "messages": [{"role": "user", "content": "Summarize briefly:\n\nhello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "content": [{"type": "text", "text": "A greeting."}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = generator_for(&server).await;
    assert_eq!(generator.provider(), "anthropic");
    let text = generator.generate("Summarize briefly:\n\nhello").await.unwrap();
    assert_eq!(text, "A greeting.");
}

#[tokio::test]
async fn test_generate_without_text_returns_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
        .mount(&server)
        .await;

    let text = generator_for(&server).await.generate("x").await.unwrap();
    assert_eq!(text, r#"{"content":[]}"#);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = generator_for(&server).await.generate("x").await.unwrap_err();
    assert_eq!(
        err,
        GenerationError::Status {
            status: 529,
            body: "overloaded".to_string()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_auth_error_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let err = generator_for(&server).await.generate("x").await.unwrap_err();
    assert!(matches!(err, GenerationError::Status { status: 401, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"content": [{"type": "text", "text": "late"}]}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = generator_for(&server).await.generate("x").await.unwrap_err();
    assert_eq!(err, GenerationError::Timeout(Duration::from_millis(500)));
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = generator_for(&server).await.generate("x").await.unwrap_err();
    assert!(matches!(err, GenerationError::Decode(_)));
}
