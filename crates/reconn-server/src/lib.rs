//! HTTP surface and process wiring for the reconn platform.

pub mod api;
pub mod api_conversation;
pub mod api_relay;
pub mod api_voice;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Json, Router,
};
use crate::config::{Config, StorageBackend};
use reconn_db::DbPool;
use reconn_pipeline::{ArtifactLayout, Pipeline, PipelineError, PipelineParts, PipelineSettings};
use reconn_queue::SqliteQueue;
use reconn_storage::{ArtifactCache, FsObjectStore, HttpBlobStore, ObjectStore};
use reconn_voice::{OpenAiClient, VoiceServiceClient};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation and voice-cloning operations, plus the row store pool.
    pub pipeline: Pipeline,
}

/// Maximum request body size (25 MiB). Wav uploads are the largest bodies.
const MAX_REQUEST_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/users",
            post(api::create_user_handler).get(api::list_users_handler),
        )
        .route(
            "/api/users/by-name/{name}",
            get(api::get_user_by_name_handler),
        )
        .route(
            "/api/users/{userId}/personas",
            post(api::create_persona_handler).get(api::list_personas_handler),
        )
        .route("/api/personas/{personaId}", get(api::get_persona_handler))
        .route(
            "/api/personas/{personaId}/context-prompt",
            put(api::update_context_prompt_handler),
        )
        .route(
            "/api/personas/{personaId}/voice-samples",
            post(api_voice::create_voice_sample_handler)
                .get(api_voice::list_voice_samples_handler),
        )
        .route(
            "/api/personas/{personaId}/voice-models/latest",
            get(api_voice::latest_voice_model_handler),
        )
        .route(
            "/api/voice-models/{id}",
            get(api_voice::get_voice_model_handler),
        )
        .route(
            "/api/voice-samples/{sampleId}/voice-models",
            post(api_voice::clone_voice_model_handler),
        )
        .route(
            "/api/voice-samples/{sampleId}/voice-models/async",
            post(api_voice::clone_voice_model_async_handler),
        )
        .route(
            "/api/personas/{personaId}/messages/text",
            post(api_conversation::text_turn_handler),
        )
        .route(
            "/api/personas/{personaId}/messages/text/async",
            post(api_conversation::text_turn_async_handler),
        )
        .route(
            "/api/personas/{personaId}/messages/voice",
            post(api_conversation::voice_turn_handler),
        )
        .route(
            "/api/personas/{personaId}/messages/voice/async",
            post(api_conversation::voice_turn_async_handler),
        )
        .route(
            "/api/personas/{personaId}/conversation",
            get(api_conversation::conversation_handler),
        )
        .route(
            "/api/reply-voices/{id}",
            get(api_conversation::get_reply_voice_handler),
        )
        .route(
            "/api/voice-output/{fileName}",
            get(api_conversation::voice_output_handler),
        )
        .route("/api/transcribe-rt", post(api_relay::transcribe_handler))
        .route(
            "/api/converse-single-prompt",
            post(api_relay::single_prompt_handler),
        )
        .route("/api/clone-rt/{key}", post(api_relay::relay_clone_handler))
        .route("/api/tts-rt/{key}", post(api_relay::relay_synthesis_handler))
        .route("/api/voice-model", get(api_relay::list_local_models_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES)),
        )
        .layer(Extension(Arc::new(state)))
}

/// Builds the object store selected by `storage.backend`.
pub fn build_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>, PipelineError> {
    let storage = &config.storage;
    Ok(match storage.backend {
        StorageBackend::Fs => Arc::new(FsObjectStore::new(&storage.fs_root)),
        StorageBackend::Http => Arc::new(HttpBlobStore::new(
            storage.http_endpoint.clone(),
            storage.sas_token.clone(),
        )?),
    })
}

/// Assembles the pipeline from configuration and an already migrated pool.
///
/// The job queue shares the row store's database.
pub fn build_pipeline(config: &Config, pool: DbPool) -> Result<Pipeline, PipelineError> {
    let storage = &config.storage;
    let store = build_object_store(config)?;
    let llm = OpenAiClient::new(config.llm.clone())?;
    let voice = VoiceServiceClient::new(&config.voice)?;
    let queue = SqliteQueue::with_timing(
        pool.clone(),
        Duration::from_millis(config.worker.poll_interval_ms),
        Duration::from_secs(config.worker.lease_secs),
    )
    .with_retry_backoff(Duration::from_millis(config.worker.retry_backoff_ms));

    Ok(Pipeline::new(PipelineParts {
        pool,
        cache: ArtifactCache::new(store),
        llm: Arc::new(llm),
        voice: Arc::new(voice),
        queue: Arc::new(queue),
        layout: ArtifactLayout {
            sample_container: storage.sample_container.clone(),
            model_container: storage.model_container.clone(),
            output_container: storage.output_container.clone(),
            sample_dir: storage.sample_dir.clone(),
            model_dir: storage.model_dir.clone(),
            output_dir: storage.output_dir.clone(),
        },
        settings: PipelineSettings {
            max_tokens: config.llm.max_tokens,
            history_limit: config.llm.history_limit,
            max_attempts: config.worker.max_attempts,
            ..PipelineSettings::default()
        },
    }))
}
