mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{wav, TestServer};
use reconn_pipeline::Outcome;
use serde_json::json;

#[tokio::test]
async fn text_turn_returns_ready_voice_and_serves_audio() {
    let server = TestServer::new();
    let persona_id = server.persona_with_voice("ada").await;

    let (status, voice) = server
        .json(
            Method::POST,
            &format!("/api/personas/{persona_id}/messages/text"),
            json!({ "message": "hi there" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voice["status"], "ready");
    let file_name = voice["fileName"].as_str().unwrap().to_string();
    assert!(file_name.starts_with(&format!("reply-{persona_id}-")));

    let response = server
        .send(
            Request::builder()
                .uri(format!("/api/voice-output/{file_name}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.0, StatusCode::OK);
    assert_eq!(response.1, b"RIFFNice to hear from you.".to_vec());
}

#[tokio::test]
async fn voice_output_sets_wav_content_type() {
    let server = TestServer::new();
    let persona_id = server.persona_with_voice("ada").await;
    let (_, voice) = server
        .json(
            Method::POST,
            &format!("/api/personas/{persona_id}/messages/text"),
            json!({ "message": "hi there" }),
        )
        .await;

    let response = tower::ServiceExt::oneshot(
        server.app(),
        Request::builder()
            .uri(format!("/api/voice-output/{}", voice["fileName"].as_str().unwrap()))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
}

#[tokio::test]
async fn missing_voice_output_is_not_found() {
    let server = TestServer::new();
    let (status, _) = server.get("/api/voice-output/reply-1-nothing.wav").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn text_turn_without_voice_model_is_not_found_and_writes_nothing() {
    let server = TestServer::new();
    let persona_id = server.persona("ada", "S").await;

    let (status, body) = server
        .json(
            Method::POST,
            &format!("/api/personas/{persona_id}/messages/text"),
            json!({ "message": "hello" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("voice model"));

    let (_, history) = server
        .get(&format!("/api/personas/{persona_id}/conversation"))
        .await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn short_message_is_rejected() {
    let server = TestServer::new();
    let persona_id = server.persona_with_voice("ada").await;
    let (status, _) = server
        .json(
            Method::POST,
            &format!("/api/personas/{persona_id}/messages/text"),
            json!({ "message": " a " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(server.llm.chats.lock().unwrap().is_empty());
}

#[tokio::test]
async fn voice_turn_rejects_non_wav_and_accepts_wav() {
    let server = TestServer::new();
    let persona_id = server.persona_with_voice("ada").await;
    let uri = format!("/api/personas/{persona_id}/messages/voice");

    let (status, _) = server.upload(&uri, "text/plain", wav()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, voice) = server.upload(&uri, "audio/wav; codecs=1", wav()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voice["status"], "ready");

    let (_, history) = server
        .get(&format!("/api/personas/{persona_id}/conversation"))
        .await;
    let rows = history.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["voiceTranscription"], "how was your day");
    assert_eq!(rows[0]["replyMessage"], "Nice to hear from you.");
}

#[tokio::test]
async fn async_text_turn_is_completed_by_worker_and_pollable() {
    let server = TestServer::new();
    let persona_id = server.persona_with_voice("ada").await;

    let (status, voice) = server
        .json(
            Method::POST,
            &format!("/api/personas/{persona_id}/messages/text/async"),
            json!({ "message": "tell me a story" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voice["status"], "processing");
    let poll = format!("/api/reply-voices/{}", voice["id"]);

    let (_, pending) = server.get(&poll).await;
    assert_eq!(pending["status"], "processing");

    assert_eq!(server.pipeline.process_next().await.unwrap(), Outcome::Complete);

    let (status, done) = server.get(&poll).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "ready");
    let file_name = done["fileName"].as_str().unwrap();
    assert!(server.remote("outputs", file_name).is_some());
}

#[tokio::test]
async fn async_voice_turn_returns_processing_row() {
    let server = TestServer::new();
    let persona_id = server.persona_with_voice("ada").await;
    let (status, voice) = server
        .upload(
            &format!("/api/personas/{persona_id}/messages/voice/async"),
            "audio/wav",
            wav(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voice["status"], "processing");
    assert_eq!(server.queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn conversation_is_newest_first_and_limited() {
    let server = TestServer::new();
    let persona_id = server.persona_with_voice("ada").await;
    for message in ["first", "second", "third"] {
        let (status, _) = server
            .json(
                Method::POST,
                &format!("/api/personas/{persona_id}/messages/text"),
                json!({ "message": message }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, history) = server
        .get(&format!("/api/personas/{persona_id}/conversation?limit=2"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = history.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["textMessage"], "third");
    assert_eq!(rows[1]["textMessage"], "second");

    let (status, _) = server.get("/api/personas/999/conversation").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_reply_voice_is_not_found() {
    let server = TestServer::new();
    let (status, _) = server.get("/api/reply-voices/12345").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
