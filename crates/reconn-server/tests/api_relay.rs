mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{wav, TestServer};
use reconn_types::{Role, Turn};
use serde_json::{json, Value};

#[tokio::test]
async fn transcribe_returns_language_and_content() {
    let server = TestServer::new();

    let (status, body) = server.upload("/api/transcribe-rt", "audio/wav", wav()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "english");
    assert_eq!(body["content"], "how was your day");

    let (status, _) = server.upload("/api/transcribe-rt", "audio/mpeg", wav()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn single_prompt_sends_system_and_user_turns_only() {
    let server = TestServer::new();

    let (status, body) = server
        .json(
            Method::POST,
            "/api/converse-single-prompt",
            json!({ "systemPrompt": "You are terse.", "userPrompt": "hello there" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Nice to hear from you.");

    let chats = server.llm.chats.lock().unwrap().clone();
    assert_eq!(
        chats,
        vec![vec![Turn::system("You are terse."), Turn::user("hello there")]]
    );
}

#[tokio::test]
async fn single_prompt_without_system_prompt_and_short_prompt() {
    let server = TestServer::new();

    let (status, _) = server
        .json(
            Method::POST,
            "/api/converse-single-prompt",
            json!({ "userPrompt": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let chats = server.llm.chats.lock().unwrap().clone();
    assert_eq!(chats[0].len(), 1);
    assert_eq!(chats[0][0].role, Role::User);

    let (status, _) = server
        .json(
            Method::POST,
            "/api/converse-single-prompt",
            json!({ "userPrompt": "a" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(server.llm.chats.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn relayed_clone_shows_up_in_the_model_listing() {
    let server = TestServer::new();

    let (status, body) = server.get("/api/voice-model").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "models": {} }));

    let (status, body) = server.upload("/api/clone-rt/grandpa", "audio/wav", wav()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "grandpa.npz");

    let (status, body) = server.get("/api/voice-model").await;
    assert_eq!(status, StatusCode::OK);
    let entry = &body["models"]["grandpa"];
    assert_eq!(entry["fileName"], "grandpa.npz");
    assert_eq!(entry["key"], "grandpa");
    assert!(entry["lastModified"].is_string());
}

#[tokio::test]
async fn relayed_clone_cannot_take_a_pipeline_key() {
    let server = TestServer::new();
    for key in ["sample-1", "model-1", "bad.key"] {
        let (status, _) = server
            .upload(&format!("/api/clone-rt/{key}"), "audio/wav", wav())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{key}");
    }
    let (_, body) = server.get("/api/voice-model").await;
    assert_eq!(body["models"], Value::Object(Default::default()));
}

#[tokio::test]
async fn relayed_synthesis_answers_with_wav_bytes() {
    let server = TestServer::new();

    let (status, body) = server
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/tts-rt/grandpa")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "text": "good night", "topK": 50 }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"RIFFgood night");

    let (status, _) = server
        .json(Method::POST, "/api/tts-rt/grandpa", json!({ "text": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
