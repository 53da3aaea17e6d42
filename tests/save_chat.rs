#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{post_json, router, router_with_memory, BrokenStore, ScriptedCompletion};
use serde_json::json;

#[tokio::test]
async fn save_chat_inserts_exactly_one_row() {
    let completion = ScriptedCompletion::replying("unused");
    let (app, store) = router_with_memory(completion.clone());

    let (status, body) = post_json(
        &app,
        "/save-chat",
        json!({"user_id": "u1", "role": "user", "message": "hi"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    let rows = store.rows("chat_history");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["user_id"], json!("u1"));
    assert_eq!(rows[0]["role"], json!("user"));
    assert_eq!(rows[0]["message"], json!("hi"));
    assert!(rows[0]["created_at"].is_string());
    assert_eq!(store.total_rows(), 1);
    assert!(completion.calls().is_empty());
}

#[tokio::test]
async fn save_chat_lists_missing_fields() {
    let (app, store) = router_with_memory(ScriptedCompletion::replying("unused"));

    let (status, body) = post_json(&app, "/save-chat", json!({"message": "hi"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"success": false, "error": "Missing or empty required field(s): user_id, role"})
    );
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn save_chat_rejects_unknown_role() {
    let (app, store) = router_with_memory(ScriptedCompletion::replying("unused"));

    let (status, body) = post_json(
        &app,
        "/save-chat",
        json!({"user_id": "u1", "role": "system", "message": "hi"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("role"));
    assert_eq!(store.total_rows(), 0);
}

#[tokio::test]
async fn save_chat_reports_store_failure() {
    let app = router(ScriptedCompletion::replying("unused"), Arc::new(BrokenStore));

    let (status, body) = post_json(
        &app,
        "/save-chat",
        json!({"user_id": "u1", "role": "assistant", "message": "hello"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"success": false, "error": "connection refused"}));
}
