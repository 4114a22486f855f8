use super::*;
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct Echo {
    ok: bool,
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).expect("valid mock url")
}

#[test]
fn server_errors_and_rate_limits_are_transient() {
    for status in [500, 502, 503, 429] {
        let error = classify_ureq_error("http://x", ureq::Error::StatusCode(status));
        assert!(error.is_retryable(), "status {status} should be retryable");
    }
}

#[test]
fn client_errors_are_fatal() {
    for status in [400, 401, 403, 404, 422] {
        let error = classify_ureq_error("http://x", ureq::Error::StatusCode(status));
        assert!(!error.is_retryable(), "status {status} should be fatal");
        assert!(error.to_string().contains(&status.to_string()));
    }
}

#[test]
fn transport_errors_are_transient() {
    assert!(classify_ureq_error("http://x", ureq::Error::ConnectionFailed).is_retryable());
    assert!(classify_ureq_error("http://x", ureq::Error::HostNotFound).is_retryable());
    assert!(
        classify_ureq_error("http://x", ureq::Error::Io(std::io::Error::other("reset")))
            .is_retryable()
    );
    assert!(
        !classify_ureq_error("http://x", ureq::Error::BadUri("nope".to_string())).is_retryable()
    );
}

#[test]
fn bearer_token_is_skipped_when_blank() {
    let transport = HttpTransport::new(Duration::from_secs(1)).with_bearer_token(Some("  "));
    assert!(transport.headers.is_empty());

    let transport = HttpTransport::new(Duration::from_secs(1)).with_bearer_token(Some("secret"));
    assert_eq!(
        transport.headers,
        vec![("Authorization".to_string(), "Bearer secret".to_string())]
    );
}

#[test]
fn invalid_urls_are_config_errors() {
    assert!(parse_url("http://localhost:11434").is_ok());
    assert!(matches!(
        parse_url("not a url"),
        Err(crate::RagError::Config(_))
    ));
}

#[tokio::test]
async fn post_json_sends_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-api-key", "k"))
        .and(body_json(json!({"question": "why"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Duration::from_secs(5)).with_header("x-api-key", "k");
    let response: Echo = transport
        .post_json(&url(&server, "/echo"), &json!({"question": "why"}))
        .await
        .expect("request should succeed");

    assert_eq!(response, Echo { ok: true });
}

#[tokio::test]
async fn status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/denied"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Duration::from_secs(5));

    let busy = transport.get_json::<Value>(&url(&server, "/busy")).await;
    assert!(matches!(busy, Err(ProviderError::Transient(_))));

    let denied = transport.get_json::<Value>(&url(&server, "/denied")).await;
    assert!(matches!(denied, Err(ProviderError::Fatal(_))));
}

#[tokio::test]
async fn malformed_body_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = HttpTransport::new(Duration::from_secs(5))
        .get_json::<Echo>(&url(&server, "/garbage"))
        .await;

    match result {
        Err(ProviderError::Fatal(message)) => assert!(message.contains("Failed to parse")),
        other => panic!("expected fatal parse error, got {other:?}"),
    }
}
