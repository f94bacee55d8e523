//! Unit tests for Langbase API types.

use super::*;
use serde_json::json;

#[test]
fn test_message_constructors() {
    let msg = Message::system("You are a rational decision-making agent");
    assert_eq!(msg.role, MessageRole::System);

    let msg = Message::user("Analyze this");
    assert_eq!(msg.role, MessageRole::User);
    assert_eq!(msg.content, "Analyze this");
}

#[test]
fn test_pipe_request_serialize() {
    let req = PipeRequest::new(
        "decision-analysis-v1",
        vec![Message::system("sys"), Message::user("prompt")],
    );
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        value,
        json!({
            "name": "decision-analysis-v1",
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "prompt"}
            ],
            "stream": false
        })
    );
}

#[test]
fn test_pipe_response_deserialize_with_usage() {
    let body = json!({
        "success": true,
        "completion": "Decision: go",
        "threadId": "thread-1",
        "raw": {
            "model": "gpt-4o-mini",
            "usage": {"prompt_tokens": 40, "completion_tokens": 60, "total_tokens": 100}
        }
    });
    let resp: PipeResponse = serde_json::from_value(body).unwrap();
    assert!(resp.success);
    assert_eq!(resp.completion, "Decision: go");
    assert_eq!(resp.total_tokens(), Some(100));
}

#[test]
fn test_pipe_response_deserialize_minimal() {
    let resp: PipeResponse =
        serde_json::from_value(json!({"success": true, "completion": "ok"})).unwrap();
    assert!(resp.raw.is_none());
    assert_eq!(resp.total_tokens(), None);
}

#[test]
fn test_usage_partial_deserialize() {
    let raw: RawResponse =
        serde_json::from_value(json!({"usage": {"prompt_tokens": 5}})).unwrap();
    let usage = raw.usage.unwrap();
    assert_eq!(usage.prompt_tokens, Some(5));
    assert!(usage.total_tokens.is_none());
    assert!(raw.model.is_none());
}

#[test]
fn test_create_pipe_request_builder_chain() {
    let req = CreatePipeRequest::new("decision-analysis-v1")
        .with_description("Structured decision analysis")
        .with_model("openai:gpt-4o-mini")
        .with_upsert(true)
        .with_temperature(3.5)
        .with_max_tokens(2000)
        .with_messages(vec![Message::system("sys")]);

    assert_eq!(req.temperature, Some(2.0));
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["upsert"], json!(true));
    assert_eq!(value["max_tokens"], json!(2000));
    assert_eq!(value["messages"][0]["role"], json!("system"));
}

#[test]
fn test_create_pipe_request_skips_unset_fields() {
    let value = serde_json::to_value(CreatePipeRequest::new("p")).unwrap();
    assert_eq!(value, json!({"name": "p"}));
}

#[test]
fn test_create_pipe_response_deserialize() {
    let resp: CreatePipeResponse = serde_json::from_value(json!({
        "name": "decision-analysis-v1",
        "description": null,
        "status": "private",
        "owner_login": "acme",
        "url": "https://langbase.com/acme/decision-analysis-v1",
        "type": "chat",
        "api_key": "pipe_key"
    }))
    .unwrap();
    assert_eq!(resp.name, "decision-analysis-v1");
    assert!(resp.url.ends_with("decision-analysis-v1"));
}
