use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(server: &MockServer, route: &str, api_key: Option<&str>) -> RemoteApiClient {
    RemoteApiClient::new(
        &format!("{}{}", server.uri(), route),
        api_key,
        Duration::from_secs(5),
    )
    .expect("valid client")
}

#[test]
fn completion_text_variants() {
    assert_eq!(extract_text(&json!({"text": "direct"})), "direct");
    assert_eq!(
        extract_text(&json!({"choices": [{"text": "first"}, {"text": "second"}]})),
        "first"
    );
    assert_eq!(extract_text(&json!({"choices": [{"index": 0}]})), "");
    assert_eq!(
        extract_text(&json!({"output": "other"})),
        r#"{"output":"other"}"#
    );
}

#[tokio::test]
async fn embed_sends_inputs_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_json(json!({"inputs": ["one", "two"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[0.1, 0.2], [0.3, 0.4]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = endpoint(&server, "/embed", Some("secret"));
    let embeddings = client
        .embed_batch(&["one".to_string(), "two".to_string()], EmbeddingTask::Document)
        .await
        .expect("should embed");

    assert_eq!(embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
}

#[tokio::test]
async fn rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let result = endpoint(&server, "/embed", None)
        .embed_batch(&["one".to_string()], EmbeddingTask::Document)
        .await;

    assert!(matches!(result, Err(ProviderError::Transient(_))));
}

#[tokio::test]
async fn missing_embeddings_field_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vectors": []})))
        .mount(&server)
        .await;

    let result = endpoint(&server, "/embed", None)
        .embed_batch(&["one".to_string()], EmbeddingTask::Document)
        .await;

    assert!(matches!(result, Err(ProviderError::Fatal(_))));
}

#[tokio::test]
async fn generate_posts_prompt_and_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_json(json!({
            "prompt": "Say hi",
            "max_tokens": 32,
            "temperature": 0.5
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"choices": [{"text": "hi"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let params = GenerationParams {
        max_tokens: 32,
        temperature: 0.5,
    };
    let answer = endpoint(&server, "/generate", None)
        .generate("Say hi", &params)
        .await
        .expect("should generate");

    assert_eq!(answer, "hi");
}

#[tokio::test]
async fn generation_http_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = endpoint(&server, "/generate", Some("wrong"))
        .generate("Say hi", &GenerationParams::default())
        .await;

    match result {
        Err(RagError::Generation(message)) => assert!(message.contains("401")),
        other => panic!("expected generation error, got {other:?}"),
    }
}
