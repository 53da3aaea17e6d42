#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{post_json, router, router_with_memory, BrokenStore, ScriptedCompletion};
use promptrelay::completion::{ResponseFormat, Role};
use serde_json::json;

#[tokio::test]
async fn extractor_passes_no_code_literal_through() {
    let completion = ScriptedCompletion::replying("No code found.");
    let (app, store) = router_with_memory(completion.clone());

    let (status, body) = post_json(&app, "/extract-code", json!({"input_text": "plain English only"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "extracted_code": "No code found."}));

    let calls = completion.calls();
    assert_eq!(calls[0].response_format, ResponseFormat::Text);
    assert_eq!(calls[0].messages[0].role, Role::System);
    assert_eq!(calls[0].messages[1].content, "plain English only");

    let rows = store.rows("code_extraction_logs");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["extracted_code"], json!("No code found."));
}

#[tokio::test]
async fn extractor_accepts_input_alias_and_falls_back_on_empty() {
    let completion = ScriptedCompletion::replying("");
    let (app, _store) = router_with_memory(completion);

    let (status, body) = post_json(&app, "/extract-code", json!({"input": "print(1) and some words"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["extracted_code"], json!("No code found"));
}

#[tokio::test]
async fn extractor_reports_missing_input_text() {
    let completion = ScriptedCompletion::replying("x");
    let (app, _store) = router_with_memory(completion.clone());

    let (status, body) = post_json(&app, "/extract-code", json!({"text": "wrong field"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"success": false, "error": "Missing or empty required field(s): input_text"})
    );
    assert!(completion.calls().is_empty());
}

#[tokio::test]
async fn text_to_code_returns_code_key() {
    let completion = ScriptedCompletion::replying("def add(a, b):\n    return a + b");
    let (app, store) = router_with_memory(completion);

    let (status, body) = post_json(
        &app,
        "/text-to-code",
        json!({"text": "python function adding two numbers", "user_id": "dev-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["code"], json!("def add(a, b):\n    return a + b"));
    let rows = store.rows("code_generation_logs");
    assert_eq!(rows[0]["user_id"], json!("dev-1"));
    assert_eq!(rows[0]["prompt"], json!("python function adding two numbers"));
}

#[tokio::test]
async fn empty_generations_use_endpoint_fallbacks() {
    let completion = ScriptedCompletion::replying("");
    let (app, _store) = router_with_memory(completion);

    let (_, code) = post_json(&app, "/text-to-code", json!({"text": "anything"})).await;
    let (_, summary) = post_json(&app, "/summarize", json!({"text": "anything"})).await;

    assert_eq!(code["code"], json!("No code generated"));
    assert_eq!(summary["summary"], json!("No summary"));
}

#[tokio::test]
async fn summarize_embeds_text_in_single_user_message() {
    let completion = ScriptedCompletion::replying("Short version.");
    let (app, store) = router_with_memory(completion.clone());

    let (status, body) = post_json(&app, "/summarize", json!({"text": "A very long article."})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "summary": "Short version."}));
    let calls = completion.calls();
    assert_eq!(calls[0].messages.len(), 1);
    assert!(calls[0].messages[0].content.contains("A very long article."));
    assert_eq!(store.rows("summary_logs")[0]["summary"], json!("Short version."));
}

#[tokio::test]
async fn generation_endpoints_survive_store_outage() {
    let completion = ScriptedCompletion::replying("result");
    let app = router(completion, Arc::new(BrokenStore));

    for (path, field, key) in [
        ("/extract-code", "input_text", "extracted_code"),
        ("/text-to-code", "text", "code"),
        ("/summarize", "text", "summary"),
    ] {
        let (status, body) = post_json(&app, path, json!({ field: "input" })).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(body["success"], json!(true), "{path}");
        assert_eq!(body[key], json!("result"), "{path}");
    }
}
