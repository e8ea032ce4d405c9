//! Provider adapter tests against mock HTTP servers.

use convogate::config::{AnthropicConfig, OllamaConfig, OpenAiConfig};
use convogate::error::GatewayError;
use convogate::providers::{
    AnthropicProvider, ChatMessage, ChatProvider, GenerationParams, OllamaProvider, OpenAiProvider,
};
use futures::StreamExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_at(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(OpenAiConfig {
        api_key: Some("sk-test".to_string()),
        api_base: server.uri(),
        model: "gpt-3.5-turbo".to_string(),
    })
    .unwrap()
}

fn anthropic_at(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(AnthropicConfig {
        api_key: Some("sk-ant-test".to_string()),
        api_base: server.uri(),
        ..Default::default()
    })
    .unwrap()
}

fn ollama_at(server: &MockServer) -> OllamaProvider {
    OllamaProvider::new(OllamaConfig {
        host: server.uri(),
        model: "llama2".to_string(),
    })
    .unwrap()
}

async fn collect(stream: convogate::providers::TextStream) -> String {
    stream
        .map(|fragment| fragment.unwrap())
        .collect::<Vec<_>>()
        .await
        .join("")
}

#[tokio::test]
async fn openai_send_parses_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-3.5-turbo",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "gpt-3.5-turbo-0125",
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = openai_at(&server);
    let result = provider
        .send(&[ChatMessage::user("hi")], &GenerationParams::default())
        .await
        .unwrap();

    assert_eq!(result.content, "Hello!");
    assert_eq!(result.model, "gpt-3.5-turbo-0125");
    assert_eq!(result.provider, "openai");
    assert!(!result.streamed);
    assert_eq!(result.usage.get("prompt_tokens"), Some(&serde_json::json!(12)));
}

#[tokio::test]
async fn openai_stream_reassembles_and_skips_corrupt_frame() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {this frame is corrupt\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"world\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = openai_at(&server);
    let stream = provider
        .stream(&[ChatMessage::user("hi")], &GenerationParams::default())
        .await
        .unwrap();

    assert_eq!(collect(stream).await, "Hello world");
}

#[tokio::test]
async fn openai_error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
        .mount(&server)
        .await;

    let provider = openai_at(&server);
    let err = provider
        .send(&[ChatMessage::user("hi")], &GenerationParams::default())
        .await
        .unwrap_err();

    match err {
        GatewayError::Provider { status, body } => {
            assert_eq!(status, Some(429));
            assert_eq!(body, "rate limit exceeded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn openai_list_models_filters_and_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"id": "gpt-4"},
                {"id": "whisper-1"},
                {"id": "gpt-3.5-turbo"}
            ]
        })))
        .mount(&server)
        .await;

    let provider = openai_at(&server);
    assert_eq!(provider.list_models().await, vec!["gpt-4", "gpt-3.5-turbo"]);

    // A failing endpoint degrades to an empty list, never an error
    let failing = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&failing)
        .await;
    assert!(openai_at(&failing).list_models().await.is_empty());
}

#[tokio::test]
async fn anthropic_send_hoists_system_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "claude-3-sonnet-20240229",
            "content": [{"type": "text", "text": "Hi."}],
            "usage": {"input_tokens": 9, "output_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = anthropic_at(&server);
    let result = provider
        .send(
            &[ChatMessage::system("be terse"), ChatMessage::user("hi")],
            &GenerationParams::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.content, "Hi.");
    assert_eq!(result.provider, "anthropic");
    assert_eq!(result.usage.get("input_tokens"), Some(&serde_json::json!(9)));
}

#[tokio::test]
async fn anthropic_stream_reads_typed_events() {
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Bon\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"jour\"}}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = anthropic_at(&server);
    let stream = provider
        .stream(&[ChatMessage::user("salut")], &GenerationParams::default())
        .await
        .unwrap();

    assert_eq!(collect(stream).await, "Bonjour");
}

#[tokio::test]
async fn ollama_send_flattens_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama2",
            "prompt": "Human: hi\n\nAssistant:",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "hello there",
            "done": true,
            "prompt_eval_count": 5,
            "eval_count": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = ollama_at(&server);
    let result = provider
        .send(&[ChatMessage::user("hi")], &GenerationParams::default())
        .await
        .unwrap();

    assert_eq!(result.content, "hello there");
    assert_eq!(result.model, "llama2");
    assert_eq!(result.usage.get("eval_count"), Some(&serde_json::json!(3)));
}

#[tokio::test]
async fn ollama_stream_reads_ndjson_frames() {
    let body = concat!(
        "{\"response\":\"wag\",\"done\":false}\n",
        "{\"response\":\"ging\",\"done\":false}\n",
        "not even json\n",
        "{\"response\":\" tails\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true,\"eval_count\":11}\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let provider = ollama_at(&server);
    let stream = provider
        .stream(&[ChatMessage::user("dogs?")], &GenerationParams::default())
        .await
        .unwrap();

    assert_eq!(collect(stream).await, "wagging tails");
}

#[tokio::test]
async fn ollama_done_frame_with_text_yields_it_and_terminates() {
    let body = concat!(
        "{\"response\":\"almost\",\"done\":false}\n",
        "{\"response\":\" done\",\"done\":true}\n",
        "{\"response\":\"never seen\",\"done\":false}\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let provider = ollama_at(&server);
    let stream = provider
        .stream(&[ChatMessage::user("hi")], &GenerationParams::default())
        .await
        .unwrap();

    assert_eq!(collect(stream).await, "almost done");
}

#[tokio::test]
async fn ollama_lists_local_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                {"name": "llama2:latest"},
                {"name": "mistral:7b"}
            ]
        })))
        .mount(&server)
        .await;

    let provider = ollama_at(&server);
    assert_eq!(
        provider.list_models().await,
        vec!["llama2:latest", "mistral:7b"]
    );
}

#[tokio::test]
async fn missing_api_key_fails_without_a_request() {
    // No mock server at all: the adapter must fail before dialing out
    let provider = OpenAiProvider::new(OpenAiConfig {
        api_key: None,
        api_base: "http://127.0.0.1:1".to_string(),
        model: "gpt-3.5-turbo".to_string(),
    })
    .unwrap();

    let err = provider
        .send(&[ChatMessage::user("hi")], &GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}

#[tokio::test]
async fn model_override_reaches_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-4"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "gpt-4",
            "choices": [{"message": {"content": "ok"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = openai_at(&server);
    let params = GenerationParams {
        model: Some("gpt-4".to_string()),
        ..Default::default()
    };
    let result = provider.send(&[ChatMessage::user("hi")], &params).await.unwrap();
    assert_eq!(result.model, "gpt-4");
}
