use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use crate::{
    core::{
        config::{Settings, StorageBackend},
        state::AppState,
    },
    create_app, finish_pending_saves, router,
};

async fn server() -> TestServer {
    let app = create_app(Settings::default()).await.unwrap();
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = server().await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let server = server().await;

    let response = server.get("/health").await;
    let id = response.header("x-request-id");
    assert!(!id.is_empty());
}

#[tokio::test]
async fn test_turn_round_trip() {
    let server = server().await;

    let first = server
        .post("/v1/turns/begin")
        .json(&json!({
            "url": "https://docs.rs/tokio/latest/tokio/",
            "selection": "A runtime for writing reliable network applications",
        }))
        .await;
    first.assert_status_ok();
    let body: Value = first.json();
    assert_eq!(body["context"]["domain"], "docs.rs");
    // System prompt plus the user message, no prior context yet
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);

    let completed = server
        .post("/v1/turns/complete")
        .json(&json!({
            "url": "https://docs.rs/tokio/latest/tokio/",
            "user": "What is tokio?",
            "assistant": "An asynchronous runtime for Rust.",
        }))
        .await;
    completed.assert_status_ok();
    let body: Value = completed.json();
    assert_eq!(body["range"]["start"], 0);
    assert_eq!(body["range"]["end"], 2);

    let second = server
        .post("/v1/turns/begin")
        .json(&json!({
            "url": "https://www.docs.rs/tokio/task",
            "selection": "Spawns a new asynchronous task",
            "mode": "summarize",
        }))
        .await;
    second.assert_status_ok();
    let body: Value = second.json();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert!(
        messages[1]["content"]
            .as_str()
            .unwrap()
            .contains("An asynchronous runtime for Rust.")
    );

    let history = server.get("/v1/conversations/docs.rs").await;
    history.assert_status_ok();
    let body: Value = history.json();
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["role"], "user");
}

#[tokio::test]
async fn test_translate_requires_language() {
    let server = server().await;

    let response = server
        .post("/v1/turns/begin")
        .json(&json!({
            "url": "https://example.com",
            "selection": "Bonjour",
            "mode": "translate",
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_unknown_conversation_is_404() {
    let server = server().await;

    server
        .get("/v1/conversations/nowhere.test")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .delete("/v1/conversations/nowhere.test")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_conversation() {
    let server = server().await;

    server
        .post("/v1/turns/complete")
        .json(&json!({
            "url": "https://example.com/a",
            "user": "hi",
            "assistant": "hello",
        }))
        .await
        .assert_status_ok();

    let list: Value = server.get("/v1/conversations").await.json();
    assert_eq!(list["conversations"].as_array().unwrap().len(), 1);

    let deleted = server.delete("/v1/conversations/example.com").await;
    deleted.assert_status_ok();
    let body: Value = deleted.json();
    assert_eq!(body["deleted"], true);

    let list: Value = server.get("/v1/conversations").await.json();
    assert!(list["conversations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_settings_save_and_flush() {
    let server = server().await;

    let saved = server
        .put("/v1/settings/font_size")
        .json(&json!({ "value": 16 }))
        .await;
    saved.assert_status(StatusCode::ACCEPTED);
    let body: Value = saved.json();
    assert_eq!(body["pending"], true);

    // Visible before the debounce fires
    let read: Value = server.get("/v1/settings/font_size").await.json();
    assert_eq!(read["value"], 16);

    let flushed: Value = server.post("/v1/settings/flush").await.json();
    assert_eq!(flushed["flushed"], 1);

    let status: Value = server.get("/v1/save/status").await.json();
    assert_eq!(status["state"], "saved");
    assert_eq!(status["key"], "font_size");
}

#[tokio::test]
async fn test_immediate_setting_save() {
    let server = server().await;

    let saved = server
        .put("/v1/settings/theme")
        .json(&json!({ "value": "dark", "immediate": true }))
        .await;
    saved.assert_status_ok();
    let body: Value = saved.json();
    assert_eq!(body["pending"], false);
    assert_eq!(body["outcome"]["outcome"], "saved");

    let read: Value = server.get("/v1/settings/theme").await.json();
    assert_eq!(read["value"], "dark");
}

#[tokio::test]
async fn test_missing_setting_is_404() {
    let server = server().await;

    server
        .get("/v1/settings/never_set")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_set_mode_persists() {
    let server = server().await;

    let response = server
        .post("/v1/mode")
        .json(&json!({ "mode": "analyze" }))
        .await;
    response.assert_status_ok();

    let read: Value = server.get("/v1/settings/mode").await.json();
    assert_eq!(read["value"], "analyze");
}

#[tokio::test]
async fn test_notification_lifecycle() {
    let server = server().await;

    let created = server
        .post("/v1/notifications")
        .json(&json!({
            "type": "warning",
            "title": "Offline",
            "message": "The provider is unreachable",
            "persistent": true,
        }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let list: Value = server.get("/v1/notifications").await.json();
    assert_eq!(list["queued"], 1);
    assert_eq!(list["visible"][0]["title"], "Offline");
    assert_eq!(list["visible"][0]["type"], "warning");

    server
        .delete(&format!("/v1/notifications/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .delete(&format!("/v1/notifications/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_notification_title_rejected() {
    let server = server().await;

    server
        .post("/v1/notifications")
        .json(&json!({ "title": "  " }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extract_and_list_entities() {
    let server = server().await;

    let extracted = server
        .post("/v1/entities/extract")
        .json(&json!({
            "text": "Dr. Ada Lovelace would have compared Rust and PostgreSQL",
            "url": "https://example.org/article",
        }))
        .await;
    extracted.assert_status_ok();
    let body: Value = extracted.json();
    assert!(!body["entities"].as_array().unwrap().is_empty());

    let listed: Value = server
        .get("/v1/entities")
        .add_query_param("domain", "example.org")
        .await
        .json();
    assert!(!listed["entities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_report_counts() {
    let server = server().await;

    server
        .post("/v1/turns/complete")
        .json(&json!({
            "url": "https://example.com",
            "user": "hi",
            "assistant": "hello",
        }))
        .await
        .assert_status_ok();

    let stats: Value = server.get("/stats").await.json();
    assert_eq!(stats["conversations"], 1);
    assert_eq!(stats["storage"], "memory");
    assert_eq!(stats["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.storage.backend = StorageBackend::File;
    settings.storage.path = dir.path().join("pagewise.json").display().to_string();

    let first = TestServer::new(create_app(settings.clone()).await.unwrap()).unwrap();
    first
        .post("/v1/turns/complete")
        .json(&json!({
            "url": "https://en.wikipedia.org/wiki/Rust",
            "user": "Who designed it?",
            "assistant": "Graydon Hoare started it.",
        }))
        .await
        .assert_status_ok();
    first
        .put("/v1/settings/language")
        .json(&json!({ "value": "fr", "immediate": true }))
        .await
        .assert_status_ok();
    drop(first);

    let second = TestServer::new(create_app(settings).await.unwrap()).unwrap();
    let history: Value = second.get("/v1/conversations/en.wikipedia.org").await.json();
    assert_eq!(history["messages"][1]["content"], "Graydon Hoare started it.");

    let language: Value = second.get("/v1/settings/language").await.json();
    assert_eq!(language["value"], "fr");

    let stats: Value = second.get("/stats").await.json();
    assert_eq!(stats["storage"], "file");
}

#[tokio::test]
async fn test_acknowledged_saves_are_flushed_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.storage.backend = StorageBackend::File;
    settings.storage.path = dir.path().join("pagewise.json").display().to_string();
    settings.save.debounce_ms = 60_000;

    let state = AppState::build(&settings).await.unwrap();
    let server = TestServer::new(router(state.clone())).unwrap();
    server
        .put("/v1/settings/zoom")
        .json(&json!({ "value": 1.25 }))
        .await
        .assert_status(StatusCode::ACCEPTED);
    assert_eq!(finish_pending_saves(&state).await, 1);
    assert_eq!(state.save.pending_count(), 0);
    drop(server);

    // A fresh process reads the flushed value from disk
    let restarted = TestServer::new(create_app(settings).await.unwrap()).unwrap();
    let zoom: Value = restarted.get("/v1/settings/zoom").await.json();
    assert_eq!(zoom["value"], 1.25);
}
