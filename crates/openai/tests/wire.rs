//! Tests for the wire format, SSE decoding and error mapping.

use qcore::{
    FinishReason, GenerationRequest, Message, ProviderError, RateLimitOrigin, Usage,
};
use quill_openai::{
    SseDecoder, SseEvent, catalog, status_error,
    wire::{ChatRequest, ChatResponse, error_message},
};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

fn request() -> GenerationRequest {
    let mut request = GenerationRequest::new("gpt-4o-mini")
        .message(Message::system("be brief"))
        .message(Message::user("hi"))
        .temperature(0.5);
    request.sampling.top_k = Some(40);
    request
}

#[test]
fn request_body() {
    let request = request();
    let body = serde_json::to_value(ChatRequest::new(&request, false)).unwrap();
    assert_eq!(
        body,
        json!({
            "model": "gpt-4o-mini",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hi" },
            ],
            "temperature": 0.5,
        })
    );
}

#[test]
fn request_body_top_k_and_stream() {
    let request = request().max_tokens(64).stop(vec!["\n\n".into()]);
    let body = serde_json::to_value(ChatRequest::new(&request, true).stream()).unwrap();
    assert_eq!(body["top_k"], 40);
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["stop"], json!(["\n\n"]));
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"], json!({ "include_usage": true }));
}

#[test]
fn response_into_result() {
    let response: ChatResponse = serde_json::from_value(json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "Hello!" },
            "finish_reason": "length",
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 },
    }))
    .unwrap();
    let result = response.into_result();
    assert_eq!(result.text, "Hello!");
    assert_eq!(result.model, "gpt-4o-mini-2024-07-18");
    assert_eq!(result.finish_reason, Some(FinishReason::Length));
    assert_eq!(result.usage, Some(Usage::new(12, 3)));
}

#[test]
fn response_without_finish_reason_stops() {
    let response: ChatResponse = serde_json::from_value(json!({
        "choices": [{ "message": { "content": null } }],
    }))
    .unwrap();
    let result = response.into_result();
    assert_eq!(result.text, "");
    assert_eq!(result.finish_reason, Some(FinishReason::Stop));
    assert_eq!(result.usage, None);
}

#[test]
fn stream_chunk_keeps_partial() {
    let chunk: ChatResponse = serde_json::from_str(
        r#"{"model":"m","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
    )
    .unwrap();
    let chunk = chunk.into_chunk();
    assert_eq!(chunk.text, "Hel");
    assert!(!chunk.is_final());

    let last: ChatResponse = serde_json::from_str(
        r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
    )
    .unwrap();
    assert_eq!(last.into_chunk().finish_reason, Some(FinishReason::FunctionCall));
}

#[test]
fn vendor_error_messages() {
    assert_eq!(
        error_message(r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error"}}"#),
        "Incorrect API key"
    );
    assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    assert_eq!(error_message(""), "empty response body");
}

#[test]
fn sse_split_across_pushes() {
    let mut decoder = SseDecoder::default();
    assert!(decoder.push(b"data: {\"a\"").is_empty());
    assert_eq!(
        decoder.push(b":1}\r\n\r\ndata: {\"b\":2}\n\n"),
        [
            SseEvent::Data(r#"{"a":1}"#.into()),
            SseEvent::Data(r#"{"b":2}"#.into()),
        ]
    );
    assert_eq!(
        decoder.push(b": keep-alive\nevent: message\ndata: [DONE]\n"),
        [SseEvent::Done]
    );
}

#[test]
fn sse_flushes_unterminated_line() {
    let mut decoder = SseDecoder::default();
    assert!(decoder.push(b"data:{\"c\":3}").is_empty());
    assert_eq!(decoder.finish(), Some(SseEvent::Data(r#"{"c":3}"#.into())));
    assert_eq!(decoder.finish(), None);
}

#[test]
fn rate_limit_mapping() {
    let err = status_error("groq", StatusCode::TOO_MANY_REQUESTS, Some("7"), "");
    assert!(matches!(
        err,
        ProviderError::RateLimited {
            origin: RateLimitOrigin::Vendor,
            retry_after: Some(d),
            ..
        } if d == Duration::from_secs(7)
    ));
    assert!(err.is_retryable());

    let err = status_error("groq", StatusCode::TOO_MANY_REQUESTS, Some("soon"), "");
    assert_eq!(err.retry_after(), None);
}

#[test]
fn status_mapping() {
    let err = status_error(
        "openai",
        StatusCode::UNAUTHORIZED,
        None,
        r#"{"error":{"message":"Incorrect API key"}}"#,
    );
    assert!(matches!(err, ProviderError::Api { status: Some(401), .. }));
    assert!(err.is_unrecoverable());
    assert!(err.to_string().contains("Incorrect API key"));

    let err = status_error("openai", StatusCode::BAD_GATEWAY, None, "");
    assert!(err.is_retryable());
    assert_eq!(err.provider_id(), Some("openai"));
}

#[test]
fn catalogs() {
    let openai = catalog("openai");
    let mini = openai.iter().find(|m| m.id == "gpt-4o-mini").unwrap();
    let cost = mini.cost(&Usage::new(1_000_000, 1_000_000));
    assert!((cost.total - 0.75).abs() < 1e-9);
    assert_eq!(cost.currency, "USD");

    assert!(!catalog("groq").is_empty());
    assert!(catalog("ollama").is_empty());
}
