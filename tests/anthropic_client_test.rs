//! HTTP-level tests for the Anthropic messages client.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sqlforge::client::{AnthropicClient, AnthropicClientConfig, ProviderClient};
use sqlforge::{GenerateRequest, SqlForgeError};

fn client_for(server: &MockServer) -> AnthropicClient {
    AnthropicClient::new(AnthropicClientConfig {
        name: "claude".into(),
        base_url: server.uri(),
        api_key: Some("sk-ant-test".into()),
        model: "claude-sonnet-4-20250514".into(),
        max_tokens: Some(512),
        temperature: None,
        timeout: Duration::from_secs(2),
        models: Vec::new(),
    })
    .unwrap()
}

#[tokio::test]
async fn generate_posts_messages_with_anthropic_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4-20250514",
            "system": "you write sql",
            "messages": [{"role": "user", "content": "list users"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg-1",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": "sql:SELECT * FROM users;"}],
            "usage": {"input_tokens": 30, "output_tokens": 12}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = GenerateRequest::new("list users").system_prompt("you write sql");
    let response = client.generate(&request).await.unwrap();

    assert_eq!(response.text, "sql:SELECT * FROM users;");
    assert_eq!(response.request_id, "msg-1");
    assert_eq!(response.usage.prompt_tokens, 30);
    assert_eq!(response.usage.completion_tokens, 12);
    assert_eq!(response.usage.total_tokens, 42);
}

#[tokio::test]
async fn multiple_text_blocks_are_concatenated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg-2",
            "content": [
                {"type": "text", "text": "sql:SELECT 1;"},
                {"type": "text", "text": "\nexplanation:trivial"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client.generate(&GenerateRequest::new("one")).await.unwrap();
    assert_eq!(response.text, "sql:SELECT 1;\nexplanation:trivial");
}

#[tokio::test]
async fn auth_failures_map_to_authentication_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.generate(&GenerateRequest::new("x")).await.unwrap_err();
    assert!(matches!(err, SqlForgeError::AuthenticationFailed));
}

#[tokio::test]
async fn overloaded_responses_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.generate(&GenerateRequest::new("x")).await.unwrap_err();
    assert!(matches!(err, SqlForgeError::Api { status: 529, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn health_check_probes_the_models_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("x-api-key", "sk-ant-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let status = client.health_check().await.unwrap();
    assert!(status.healthy);
}
