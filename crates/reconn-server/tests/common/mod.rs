#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use reconn_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use reconn_pipeline::{ArtifactLayout, Pipeline, PipelineParts, PipelineSettings};
use reconn_queue::SqliteQueue;
use reconn_server::{app, AppState};
use reconn_storage::{ArtifactCache, FsObjectStore};
use reconn_types::Turn;
use reconn_voice::{LanguageModel, SynthesisParams, Transcription, VoiceError, VoiceProvider};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot

pub struct FakeLlm {
    pub chats: Mutex<Vec<Vec<Turn>>>,
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn chat_completion(
        &self,
        turns: &[Turn],
        _max_tokens: u32,
    ) -> Result<Vec<String>, VoiceError> {
        self.chats.lock().unwrap().push(turns.to_vec());
        Ok(vec!["Nice to hear from you.".to_string()])
    }

    async fn transcribe(&self, _wav: &[u8]) -> Result<Transcription, VoiceError> {
        Ok(Transcription {
            language: "english".to_string(),
            text: "how was your day".to_string(),
        })
    }
}

/// Writes `<key>.npz` into the shared model directory, like the real
/// service, and answers synthesis with a tiny RIFF body.
pub struct FakeVoice {
    pub model_dir: PathBuf,
}

#[async_trait]
impl VoiceProvider for FakeVoice {
    async fn clone_voice(&self, key: &str, wav: &[u8]) -> Result<String, VoiceError> {
        let file = format!("{key}.npz");
        std::fs::write(self.model_dir.join(&file), wav).unwrap();
        Ok(file)
    }

    async fn synthesize(
        &self,
        _key: &str,
        text: &str,
        _params: &SynthesisParams,
    ) -> Result<Vec<u8>, VoiceError> {
        let mut audio = b"RIFF".to_vec();
        audio.extend_from_slice(text.as_bytes());
        Ok(audio)
    }
}

pub struct TestServer {
    pub dir: TempDir,
    pub pool: DbPool,
    pub pipeline: Pipeline,
    pub llm: Arc<FakeLlm>,
    pub queue: SqliteQueue,
}

impl TestServer {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("server.db");
        let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        run_migrations(&pool.get().unwrap()).unwrap();

        let local = dir.path().join("local");
        let layout = ArtifactLayout {
            sample_container: "samples".to_string(),
            model_container: "models".to_string(),
            output_container: "outputs".to_string(),
            sample_dir: local.join("samples"),
            model_dir: local.join("models"),
            output_dir: local.join("outputs"),
        };
        layout.ensure_local_dirs().unwrap();

        let llm = Arc::new(FakeLlm {
            chats: Mutex::new(Vec::new()),
        });
        let voice = Arc::new(FakeVoice {
            model_dir: layout.model_dir.clone(),
        });
        let queue = SqliteQueue::with_timing(
            pool.clone(),
            Duration::from_millis(10),
            Duration::from_secs(60),
        )
        .with_retry_backoff(Duration::ZERO);

        let pipeline = Pipeline::new(PipelineParts {
            pool: pool.clone(),
            cache: ArtifactCache::new(Arc::new(FsObjectStore::new(dir.path().join("remote")))),
            llm: llm.clone(),
            voice,
            queue: Arc::new(queue.clone()),
            layout,
            settings: PipelineSettings::default(),
        });

        Self {
            dir,
            pool,
            pipeline,
            llm,
            queue,
        }
    }

    pub fn app(&self) -> Router {
        app(AppState {
            pipeline: self.pipeline.clone(),
        })
    }

    pub fn remote(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.dir.path().join("remote").join(container).join(name)).ok()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        (status, json_or_null(&body))
    }

    pub async fn json(&self, method: Method, uri: &str, payload: Value) -> (StatusCode, Value) {
        let (status, body) = self
            .send(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await;
        (status, json_or_null(&body))
    }

    pub async fn upload(&self, uri: &str, content_type: &str, body: Vec<u8>) -> (StatusCode, Value) {
        let (status, body) = self
            .send(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        (status, json_or_null(&body))
    }

    /// Creates a user and a persona through the API; returns the persona id.
    pub async fn persona(&self, user: &str, context_prompt: &str) -> i64 {
        let (status, user) = self
            .json(Method::POST, "/api/users", serde_json::json!({ "name": user }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, persona) = self
            .json(
                Method::POST,
                &format!("/api/users/{}/personas", user["id"]),
                serde_json::json!({ "name": "grandma", "contextPrompt": context_prompt }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        persona["id"].as_i64().unwrap()
    }

    /// A persona with a ready voice model, cloned through the sync endpoint.
    pub async fn persona_with_voice(&self, user: &str) -> i64 {
        let persona_id = self.persona(user, "You are warm.").await;
        let (status, sample) = self
            .upload(
                &format!("/api/personas/{persona_id}/voice-samples"),
                "audio/wav",
                wav(),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, model) = self
            .json(
                Method::POST,
                &format!("/api/voice-samples/{}/voice-models", sample["id"]),
                Value::Null,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(model["status"], "ready");
        persona_id
    }
}

fn json_or_null(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

/// A body that passes wav validation.
pub fn wav() -> Vec<u8> {
    let mut body = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
    body.resize(256, 0);
    body
}
