//! Client behavior against a mock API server.

use std::time::Duration;

use promptline_client::{
    Client, ClientError, CompletionRequest, ExponentialBackoff, Message, MessageRequest,
    RetryPolicy, StreamError,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "dummy-api-key";

/// Client pointed at the mock server, retrying without waiting.
fn client_for(server: &MockServer) -> Client {
    Client::new(API_KEY)
        .unwrap()
        .with_base_url(server.uri())
        .with_retry_policy(RetryPolicy::Exponential(ExponentialBackoff::new(
            3,
            Duration::ZERO,
            Duration::ZERO,
        )))
}

fn completion_request() -> CompletionRequest {
    CompletionRequest::new("claude-1", "test prompt", 64)
}

#[tokio::test]
async fn create_completion_decodes_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(header("x-api-key", API_KEY))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "prompt": "test prompt",
            "model": "claude-1",
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cmpl-uqkvlQyYK7bGYrRHQ0eXlWi7",
            "object": "text_completion",
            "created": 1589478378,
            "model": "claude-1",
            "choices": [{
                "text": "\n\nThis is a test completion.",
                "index": 0,
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 10, "total_tokens": 15}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client_for(&server)
        .create_completion(&completion_request())
        .await
        .unwrap();

    assert_eq!(resp.id, "cmpl-uqkvlQyYK7bGYrRHQ0eXlWi7");
    assert_eq!(resp.choices[0].text, "\n\nThis is a test completion.");
    assert_eq!(resp.usage.total_tokens, 15);
}

#[tokio::test]
async fn stream_completions_yields_chunks_in_order() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"text\":\"This is a \"}]}\n\n",
        "data: {\"choices\":[{\"text\":\"test \"}]}\n\n",
        "data: {\"choices\":[{\"text\":\"completion.\",\"finish_reason\":\"stop\"}]}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(header("x-api-key", API_KEY))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut stream = client_for(&server)
        .stream_completions(&completion_request())
        .await;

    let mut full = String::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => full.push_str(&chunk.text()),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(full, "This is a test completion.");
}

#[tokio::test]
async fn stream_rejected_status_short_circuits() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1) // streams are never retried
        .mount(&server)
        .await;

    let req = MessageRequest::new("claude-1", vec![Message::user("hello")], 32);
    let (responses, errors) = client_for(&server).stream_messages(&req).await.collect().await;

    assert!(responses.is_empty());
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        StreamError::Api(e) => {
            assert_eq!(e.status_code, 503);
            assert_eq!(e.message, "overloaded");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_with_non_event_stream_body_short_circuits() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"text": "not streamed"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (responses, errors) = client_for(&server)
        .stream_completions(&completion_request())
        .await
        .collect()
        .await;

    assert!(responses.is_empty());
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        StreamError::Request(msg) => assert!(msg.contains("application/json"), "{msg}"),
        other => panic!("expected request error, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_rejection_with_truncated_body_keeps_status() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        // promises more body than it sends, then hangs up
        let _ = socket
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 100\r\n\r\nshort")
            .await;
    });

    let client = Client::new(API_KEY)
        .unwrap()
        .with_base_url(format!("http://{addr}"));
    let (responses, errors) = client
        .stream_completions(&completion_request())
        .await
        .collect()
        .await;

    assert!(responses.is_empty());
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        StreamError::Api(e) => {
            assert_eq!(e.status_code, 503);
            assert!(e.message.is_empty());
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_connection_failure_short_circuits() {
    let client = Client::new(API_KEY)
        .unwrap()
        .with_base_url("http://127.0.0.1:1");

    let (responses, errors) = client
        .stream_completions(&completion_request())
        .await
        .collect()
        .await;

    assert!(responses.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], StreamError::Request(_)));
}

#[tokio::test]
async fn stream_messages_reports_in_band_errors() {
    let server = MockServer::start().await;

    let body = concat!(
        "event: message\n",
        "data: {\"choices\":[{\"index\":0,\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n",
        "\n",
        "data: {oops\n",
        "\n",
        "data: {\"choices\":[{\"index\":0,\"message\":{\"role\":\"assistant\",\"content\":\"lo\"}}]}\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let req = MessageRequest::new("claude-1", vec![Message::user("hello")], 32);
    let (responses, errors) = client_for(&server).stream_messages(&req).await.collect().await;

    let text: String = responses.iter().map(|r| r.content()).collect();
    assert_eq!(text, "Hello");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], StreamError::Decode(_)));
}

#[tokio::test]
async fn client_errors_are_returned_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"bad request"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let req = MessageRequest::new("claude-1", vec![Message::user("hello")], 32);
    let err = client_for(&server).create_message(&req).await.unwrap_err();

    assert_eq!(err.status_code(), Some(400));
    match err {
        ClientError::Api(e) => assert_eq!(e.message, r#"{"error":"bad request"}"#),
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_retried_until_budget_is_spent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_completion(&completion_request())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(500));
}

#[tokio::test]
async fn server_error_then_success_recovers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "msg-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "I'm well, thanks."},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let req = MessageRequest::new(
        "claude-1",
        vec![
            Message::system("You are a friendly and helpful AI assistant."),
            Message::user("Hello, how are you today?"),
        ],
        64,
    );
    let resp = client_for(&server).create_message(&req).await.unwrap();

    assert_eq!(resp.content(), "I'm well, thanks.");
}

#[tokio::test]
async fn list_models_sends_cursor_and_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(query_param("cursor", "next page"))
        .and(query_param("limit", "2"))
        .and(header("x-api-key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"id": "claude-1", "object": "model", "owned_by": "anthropic"},
                {"id": "claude-instant-1", "object": "model", "owned_by": "anthropic"}
            ],
            "object": "list",
            "limit": 2,
            "offset": 0,
            "total": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let list = client_for(&server)
        .list_models(Some("next page"), 2)
        .await
        .unwrap();

    let ids: Vec<_> = list.models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["claude-1", "claude-instant-1"]);
    assert_eq!(list.total, 5);
}

#[tokio::test]
async fn undecodable_success_body_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server).list_models(None, 10).await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}
