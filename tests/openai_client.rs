// tests/openai_client.rs
//! OpenAI chat-completions client against a local mock server, and the
//! classifier's fallback when the provider misbehaves.

use std::sync::Arc;
use std::time::Duration;

use normativa_relevance::llm::{CompletionClient, CompletionRequest, LlmError, OpenAiClient};
use normativa_relevance::{classify_by_rules, ClassificationResult, LlmClassifier, RuleTable};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PATH: &str = "/v1/chat/completions";

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
        ]
    })
}

fn client(server: &MockServer, timeout: Duration) -> OpenAiClient {
    let endpoint = format!("{}{PATH}", server.uri());
    OpenAiClient::new("sk-test", Some(&endpoint), timeout).expect("client")
}

fn classifier(server: &MockServer, timeout: Duration) -> LlmClassifier {
    LlmClassifier::new(
        Arc::new(client(server, timeout)),
        "gpt-4o-mini",
        Arc::new(RuleTable::builtin()),
    )
}

#[tokio::test]
async fn sends_model_and_auth_and_parses_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini", "max_tokens": 150 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "RELEVANTE: SÍ\nRAZÓN: Modifica obligaciones de todos los contribuyentes",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let r = classifier(&server, Duration::from_secs(5))
        .classify("RESOLUCIÓN EXENTA N° 12 DEL SII", None)
        .await;
    assert_eq!(
        r,
        ClassificationResult::relevant("Modifica obligaciones de todos los contribuyentes")
    );
}

#[tokio::test]
async fn server_error_surfaces_status_and_classifier_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let req = CompletionRequest {
        system: "s".into(),
        prompt: "p".into(),
        model: "gpt-4o-mini".into(),
        temperature: 0.3,
        max_tokens: 10,
    };
    let err = client(&server, Duration::from_secs(5))
        .complete(&req)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LlmError::Status {
            status: 500,
            body: "upstream exploded".into()
        }
    );

    let title = "FIJA PRECIOS DE PARIDAD PARA COMBUSTIBLES SEMANA DEL 3 AL 9 DE MARZO";
    let r = classifier(&server, Duration::from_secs(5)).classify(title, None).await;
    assert_eq!(r, classify_by_rules(title));
}

#[tokio::test]
async fn slow_provider_times_out_into_rules() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("RELEVANTE: SÍ\nRAZÓN: tarde"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let title = "CIRCULAR SII SOBRE DECLARACIÓN DE IMPUESTOS";
    let r = classifier(&server, Duration::from_millis(200))
        .classify(title, None)
        .await;
    assert_eq!(r, ClassificationResult::relevant("Normativa tributaria del SII"));
}

#[tokio::test]
async fn empty_choices_are_an_empty_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let req = CompletionRequest {
        system: "s".into(),
        prompt: "p".into(),
        model: "m".into(),
        temperature: 0.0,
        max_tokens: 5,
    };
    let err = client(&server, Duration::from_secs(5))
        .complete(&req)
        .await
        .unwrap_err();
    assert_eq!(err, LlmError::EmptyCompletion);
}

#[test]
fn blank_key_is_rejected() {
    assert!(matches!(
        OpenAiClient::new("  ", None, Duration::from_secs(1)),
        Err(LlmError::MissingApiKey)
    ));
}
